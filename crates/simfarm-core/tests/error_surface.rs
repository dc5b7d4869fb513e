use simfarm_core::errors::{ErrorInfo, SimError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("name", "job_1")
        .with_hint("check the status file")
}

#[test]
fn jobs_error_surface() {
    let err = SimError::Jobs(sample_info("duplicate-job", "job is already tracked"));
    assert_eq!(err.code(), "duplicate-job");
    assert!(err.info().context.contains_key("name"));
    assert_eq!(err.info().hint.as_deref(), Some("check the status file"));
}

#[test]
fn eval_error_surface() {
    let err = SimError::Eval(sample_info("eval-forbidden", "call outside the allowlist"));
    assert_eq!(err.code(), "eval-forbidden");
}

#[test]
fn display_carries_code_and_message() {
    let err = SimError::State(ErrorInfo::new("not-paused", "the orchestrator is not paused"));
    let rendered = err.to_string();
    assert!(rendered.contains("not-paused"));
    assert!(rendered.contains("the orchestrator is not paused"));
}

#[test]
fn errors_serialize_with_family_and_detail() {
    let err = SimError::Remote(ErrorInfo::new("remote-path-missing", "no such folder"));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "Remote");
    assert_eq!(json["detail"]["code"], "remote-path-missing");
}
