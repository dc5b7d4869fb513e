//! Map walk tests with closure runners and evaluators.

use std::cell::RefCell;
use std::rc::Rc;

use simfarm_core::SimError;
use simfarm_search::{EvaluationMode, SearchEngine, SweepNode};
use simfarm_sim::{Setting, SettingCoordinate, SettingValue, SettingsSet, SimulationSpec};

fn default_spec() -> SimulationSpec {
    SimulationSpec::new("unused").with_set(SettingsSet {
        name: "model".into(),
        index: 0,
        settings: vec![
            Setting::new("x", SettingValue::Number(0.0)),
            Setting::new("y", SettingValue::Number(0.0)),
        ],
    })
}

fn setting_number(spec: &SimulationSpec, name: &str) -> f64 {
    spec.get_setting(&SettingCoordinate::new("model", name))
        .unwrap()
        .value
        .as_number()
        .unwrap()
        .unwrap()
}

fn no_op_runner(
) -> impl FnMut(&[SimulationSpec]) -> Result<Vec<SimulationSpec>, SimError> {
    |_specs: &[SimulationSpec]| Ok(Vec::new())
}

#[test]
fn range_sweep_stops_at_the_crossing() {
    let map = SweepNode::from_json_str(
        r#"{
            "settings": [{"set": "model", "name": "x"}],
            "values": {"from": 0, "to": 10, "n": 3},
            "stop": 5
        }"#,
    )
    .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let evaluator = move |specs: &[SimulationSpec], _depth: usize| -> Result<f64, SimError> {
        let x = setting_number(&specs[0], "x");
        log.borrow_mut().push(x);
        Ok(x)
    };

    let mut engine = SearchEngine::new(no_op_runner(), evaluator, default_spec());
    engine.set_map(map);
    let output = engine.follow_map().unwrap();

    // The stop fires at the second value; the third is never evaluated.
    assert_eq!(output.records.len(), 2);
    assert_eq!(output.records[0].evaluation, 0.0);
    assert_eq!(output.records[1].evaluation, 5.0);
    assert!(output.records[1].stops.iter().any(|s| s.depth == 0 && s.fired));
    assert_eq!(*seen.borrow(), vec![0.0, 5.0]);

    let stops = engine.find_stops(0).unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].1, 1);
    assert_eq!(stops[0].0.len(), 1);
    assert_eq!(stops[0].0[0].coordinate.name, "x");
}

#[test]
fn nested_sweep_interrupts_the_outer_level() {
    let map = SweepNode::from_json_str(
        r#"{
            "settings": [{"set": "model", "name": "x"}],
            "values": [1, 2, 3],
            "stop": 15,
            "foreach": {
                "settings": [{"set": "model", "name": "y"}],
                "values": [0, 1]
            }
        }"#,
    )
    .unwrap();

    let evaluator = |specs: &[SimulationSpec], _depth: usize| -> Result<f64, SimError> {
        Ok(setting_number(&specs[0], "x") * 10.0 + setting_number(&specs[0], "y"))
    };

    let mut engine = SearchEngine::new(no_op_runner(), evaluator, default_spec());
    engine.set_map(map);
    let output = engine.follow_map().unwrap();

    // x = 3 is never explored: subtree tails 11 and 21 bracket 15.
    assert_eq!(output.records.len(), 4);
    assert_eq!(output.records[3].evaluation, 21.0);
    assert!(output.records[3].stops.iter().any(|s| s.depth == 0 && s.fired));

    let stops = engine.find_stops(0).unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].1, 3);
    // The prefix covers the outer level only.
    assert_eq!(stops[0].0.len(), 1);
}

#[test]
fn group_mode_evaluates_the_batch_once() {
    let map = SweepNode::from_json_str(
        r#"{
            "settings": [{"set": "model", "name": "x"}],
            "values": [1, 2, 3]
        }"#,
    )
    .unwrap();

    let evaluator = |specs: &[SimulationSpec], _depth: usize| -> Result<f64, SimError> {
        Ok(specs.iter().map(|s| setting_number(s, "x")).sum())
    };

    let mut engine = SearchEngine::new(no_op_runner(), evaluator, default_spec());
    engine.set_mode(EvaluationMode::Group);
    engine.set_map(map);
    let output = engine.follow_map().unwrap();

    assert_eq!(output.records.len(), 1);
    assert_eq!(output.records[0].evaluation, 6.0);
    let group = output.records[0].group_settings.as_ref().unwrap();
    assert_eq!(group.len(), 3);
}

#[test]
fn save_hook_writes_numbered_subfolders() {
    let map = SweepNode::from_json_str(
        r#"{
            "settings": [{"set": "model", "name": "x"}],
            "values": [1, 2]
        }"#,
    )
    .unwrap();

    let root = tempfile::tempdir().unwrap();
    let evaluator =
        |_specs: &[SimulationSpec], _depth: usize| -> Result<f64, SimError> { Ok(0.0) };

    let mut engine = SearchEngine::new(no_op_runner(), evaluator, default_spec());
    engine.set_map(map);
    engine.set_save_hook(root.path(), |_spec, folder| {
        std::fs::write(folder.join("marker"), "ok").unwrap();
        Ok(())
    });
    let output = engine.follow_map().unwrap();

    // In EACH mode every simulation forms its own numbered batch.
    for (k, record) in output.records.iter().enumerate() {
        let saved = record.saved_to.as_ref().unwrap();
        assert_eq!(saved, &root.path().join(k.to_string()).join("0"));
        assert!(saved.join("marker").is_file());
        assert!(saved.join("settings.json").is_file());
    }
}

#[test]
fn unproduced_simulations_abort_the_walk() {
    let map = SweepNode::from_json_str(
        r#"{
            "settings": [{"set": "model", "name": "x"}],
            "values": [1]
        }"#,
    )
    .unwrap();

    let runner = |specs: &[SimulationSpec]| -> Result<Vec<SimulationSpec>, SimError> {
        Ok(specs.to_vec())
    };
    let evaluator =
        |_specs: &[SimulationSpec], _depth: usize| -> Result<f64, SimError> { Ok(0.0) };

    let mut engine = SearchEngine::new(runner, evaluator, default_spec());
    engine.set_map(map);
    let err = engine.follow_map().unwrap_err();
    assert_eq!(err.code(), "simulations-missing");
}
