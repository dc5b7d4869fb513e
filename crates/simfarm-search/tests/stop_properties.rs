use proptest::prelude::*;

use simfarm_search::{check_stop, StopCondition};

proptest! {
    #[test]
    fn numeric_stop_matches_the_bracket_sign_test(
        a in -1e6f64..1e6,
        b in -1e6f64..1e6,
        target in -1e6f64..1e6,
    ) {
        let fired = check_stop(&StopCondition::Number(target), &[a, b]).unwrap();
        prop_assert_eq!(fired, (a - target) * (b - target) <= 0.0);
    }

    #[test]
    fn numeric_stop_needs_two_evaluations(
        a in -1e6f64..1e6,
        target in -1e6f64..1e6,
    ) {
        prop_assert!(!check_stop(&StopCondition::Number(target), &[a]).unwrap());
        prop_assert!(!check_stop(&StopCondition::Number(target), &[]).unwrap());
    }

    #[test]
    fn history_prefix_grows_monotonically_toward_firing(
        evals in proptest::collection::vec(-100f64..100.0, 2..16),
        target in -100f64..100.0,
    ) {
        // Once some prefix brackets the target, the check must have fired at
        // the first such prefix, never before the second evaluation.
        let stop = StopCondition::Number(target);
        let mut fired_at = None;
        for n in 1..=evals.len() {
            if check_stop(&stop, &evals[..n]).unwrap() && fired_at.is_none() {
                fired_at = Some(n);
            }
        }
        if let Some(n) = fired_at {
            prop_assert!(n >= 2);
            prop_assert!((evals[n - 2] - target) * (evals[n - 1] - target) <= 0.0);
        }
    }
}
