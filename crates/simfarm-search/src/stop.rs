//! Stop conditions, checked against the running evaluation history.

use serde::{Deserialize, Serialize};
use simfarm_core::expr::{self, leading_comparison, resolve_index, Expr};
use simfarm_core::SimError;

/// Condition interrupting a sweep level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopCondition {
    /// Crossing target: fires when two consecutive evaluations bracket it.
    Number(f64),
    /// Expression over the history, with `[k]` index references. A string
    /// starting with a comparison operator applies to the latest evaluation.
    Expr(String),
}

impl StopCondition {
    /// Numeric crossing target, when the condition is one.
    pub fn target(&self) -> Option<f64> {
        match self {
            StopCondition::Number(target) => Some(*target),
            StopCondition::Expr(_) => None,
        }
    }
}

/// Checks a stop condition against the evaluation history.
///
/// Index references that fall outside the history make the condition false
/// rather than an error: early iterations harmlessly fail the check until
/// enough history accumulates. Two distinct negative indices that land on
/// the same element also make it false, since the condition meant to compare
/// different evaluations. Forbidden expression syntax stays a hard error.
pub fn check_stop(condition: &StopCondition, evaluations: &[f64]) -> Result<bool, SimError> {
    match condition {
        StopCondition::Number(target) => {
            let [.., previous, latest] = evaluations else {
                return Ok(false);
            };
            Ok((previous - target) * (latest - target) <= 0.0)
        }
        StopCondition::Expr(source) => {
            let source = source.trim();
            if leading_comparison(source) {
                if evaluations.is_empty() {
                    return Ok(false);
                }
                let expr = Expr::parse(&format!("[-1] {source}"), true)?;
                return evaluate_with_history(&expr, evaluations);
            }

            let expr = Expr::parse(source, true)?;

            let mut indices = Vec::new();
            expr.history_indices(&mut indices);
            indices.sort_unstable();
            indices.dedup();

            let mut normalized: Vec<i64> = indices
                .iter()
                .map(|&k| if k >= 0 { k } else { k + evaluations.len() as i64 })
                .collect();
            normalized.sort_unstable();
            normalized.dedup();
            if normalized.len() < indices.len() {
                return Ok(false);
            }

            if indices
                .iter()
                .any(|&k| resolve_index(k, evaluations.len()).is_none())
            {
                return Ok(false);
            }

            evaluate_with_history(&expr, evaluations)
        }
    }
}

fn evaluate_with_history(expr: &Expr, evaluations: &[f64]) -> Result<bool, SimError> {
    match expr::eval(expr, evaluations) {
        Ok(value) => value.truthy(),
        Err(err) if err.code() == "eval-history" => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_target_fires_on_a_crossing() {
        let stop = StopCondition::Number(0.0);
        assert!(check_stop(&stop, &[1.0, -1.0]).unwrap());
        assert!(!check_stop(&stop, &[1.0, 2.0]).unwrap());
        assert!(!check_stop(&stop, &[1.0]).unwrap());
    }

    #[test]
    fn numeric_target_fires_on_an_exact_hit() {
        assert!(check_stop(&StopCondition::Number(5.0), &[0.0, 5.0]).unwrap());
    }

    #[test]
    fn leading_operator_applies_to_the_latest_evaluation() {
        let stop = StopCondition::Expr("> 0".to_string());
        assert!(check_stop(&stop, &[-1.0, 2.0]).unwrap());
        assert!(!check_stop(&stop, &[2.0, -1.0]).unwrap());
        assert!(!check_stop(&stop, &[]).unwrap());
    }

    #[test]
    fn out_of_range_indices_are_false_not_errors() {
        let stop = StopCondition::Expr("[0] > [-3]".to_string());
        assert!(!check_stop(&stop, &[1.0, 2.0]).unwrap());
        assert!(check_stop(&stop, &[5.0, 2.0, 1.0]).unwrap());
    }

    #[test]
    fn aliased_negative_indices_invalidate_the_check() {
        // With two evaluations, [0] and [-2] are the same element.
        let stop = StopCondition::Expr("[0] == [-2]".to_string());
        assert!(!check_stop(&stop, &[1.0, 2.0]).unwrap());
        assert!(check_stop(&stop, &[2.0, 2.0, 1.0]).unwrap());
    }

    #[test]
    fn forbidden_syntax_is_a_hard_error() {
        let stop = StopCondition::Expr("exec(1) > 0".to_string());
        let err = check_stop(&stop, &[1.0]).unwrap_err();
        assert_eq!(err.code(), "eval-forbidden");
    }
}
