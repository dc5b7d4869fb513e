//! The sweep map: a chain of nested levels, each varying one or more
//! settings over a list of values.

use serde::{Deserialize, Deserializer, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_sim::{format_number, SettingCoordinate, SettingValue};

use crate::stop::StopCondition;

/// One level of the sweep.
///
/// A level without `foreach` is a leaf: its value combinations are turned
/// into concrete simulations. A level with `foreach` recurses, increasing
/// the depth by one per nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepNode {
    /// Settings varied at this level. Declarations may use the singular
    /// `setting` key and a bare coordinate instead of a list.
    #[serde(alias = "setting", deserialize_with = "one_or_many")]
    pub settings: Vec<SettingCoordinate>,
    /// Values taken by the varied settings, in evaluation order.
    pub values: ValueSpec,
    /// Nested level, evaluated once per value of this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<Box<SweepNode>>,
    /// Condition interrupting the iteration at this level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopCondition>,
}

impl SweepNode {
    /// Parses a map declaration from JSON.
    ///
    /// A level without a `values` key is a declaration bug and fails with
    /// the `values-missing` code.
    pub fn from_json_str(source: &str) -> Result<Self, SimError> {
        serde_json::from_str(source).map_err(|err| {
            let code = if err.to_string().contains("missing field `values`") {
                "values-missing"
            } else {
                "map-parse"
            };
            SimError::Sweep(ErrorInfo::new(code, err.to_string()))
        })
    }

    /// Returns the chain of levels from this node down, one per depth.
    pub fn depths(&self) -> Vec<&SweepNode> {
        let mut levels = vec![self];
        let mut current = self;
        while let Some(child) = current.foreach.as_deref() {
            levels.push(child);
            current = child;
        }
        levels
    }

    /// Mutable access to the level at the given depth, if it exists.
    pub fn level_mut(&mut self, depth: usize) -> Option<&mut SweepNode> {
        let mut current = self;
        for _ in 0..depth {
            current = current.foreach.as_deref_mut()?;
        }
        Some(current)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<SettingCoordinate>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(SettingCoordinate),
        Many(Vec<SettingCoordinate>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(coords) => vec![coords],
        OneOrMany::Many(coords) => coords,
    })
}

/// Value source of one sweep level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    /// Explicit ordered list.
    List(Vec<SettingValue>),
    /// `n` linearly interpolated values between two endpoints.
    Range {
        /// First value, scalar or vector.
        from: SettingValue,
        /// Last value, scalar or vector.
        to: SettingValue,
        /// Number of values, at least two.
        n: usize,
    },
}

/// Materializes the ordered value list of a level.
///
/// Interpolated values are kept symbolic, as `((a + k*(b-a)/(n-1)))`
/// deferred expressions, so no precision is lost before they are resolved
/// at render or fingerprint time. Vector endpoints interpolate
/// component-wise.
pub fn build_values(spec: &ValueSpec) -> Result<Vec<SettingValue>, SimError> {
    match spec {
        ValueSpec::List(values) => Ok(values.clone()),
        ValueSpec::Range { from, to, n } => {
            if *n < 2 {
                return Err(SimError::Sweep(
                    ErrorInfo::new("values-count", "an interpolated range needs at least two values")
                        .with_context("n", n.to_string()),
                ));
            }
            match (from, to) {
                (SettingValue::List(starts), SettingValue::List(ends)) => {
                    let mut values = Vec::with_capacity(*n);
                    for k in 0..*n {
                        let components = starts
                            .iter()
                            .zip(ends.iter())
                            .map(|(a, b)| interpolated(a, b, k, *n))
                            .collect::<Result<Vec<_>, _>>()?;
                        values.push(SettingValue::List(components));
                    }
                    Ok(values)
                }
                (from, to) => (0..*n).map(|k| interpolated(from, to, k, *n)).collect(),
            }
        }
    }
}

fn interpolated(
    from: &SettingValue,
    to: &SettingValue,
    k: usize,
    n: usize,
) -> Result<SettingValue, SimError> {
    let a = endpoint(from)?;
    let b = endpoint(to)?;
    Ok(SettingValue::Str(format!(
        "((({a}) + {k} * (({b}) - ({a})) / {}))",
        n - 1
    )))
}

/// Renders a range endpoint as an expression fragment.
fn endpoint(value: &SettingValue) -> Result<String, SimError> {
    match value {
        SettingValue::Number(n) => Ok(format_number(*n)),
        SettingValue::Str(s) => Ok(s.clone()),
        other => Err(SimError::Sweep(
            ErrorInfo::new("values-format", "range endpoints must be numbers or expressions")
                .with_context("endpoint", format!("{other:?}")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_setting_key_is_accepted() {
        let node = SweepNode::from_json_str(
            r#"{"setting": {"set": "model", "name": "x"}, "values": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(node.settings.len(), 1);
        assert_eq!(node.settings[0].name, "x");
    }

    #[test]
    fn missing_values_is_a_declaration_error() {
        let err =
            SweepNode::from_json_str(r#"{"settings": [{"set": "model", "name": "x"}]}"#)
                .unwrap_err();
        assert_eq!(err.code(), "values-missing");
    }

    #[test]
    fn ranges_build_symbolic_values() {
        let values = build_values(&ValueSpec::Range {
            from: SettingValue::Number(0.0),
            to: SettingValue::Number(10.0),
            n: 3,
        })
        .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(
            values[1],
            SettingValue::Str("(((0) + 1 * ((10) - (0)) / 2))".to_string())
        );
        let resolved: Vec<f64> = values
            .iter()
            .map(|v| v.as_number().unwrap().unwrap())
            .collect();
        assert_eq!(resolved, vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn vector_ranges_interpolate_component_wise() {
        let values = build_values(&ValueSpec::Range {
            from: SettingValue::List(vec![SettingValue::Number(0.0), SettingValue::Number(1.0)]),
            to: SettingValue::List(vec![SettingValue::Number(2.0), SettingValue::Number(3.0)]),
            n: 2,
        })
        .unwrap();
        match &values[1] {
            SettingValue::List(components) => {
                let resolved: Vec<f64> = components
                    .iter()
                    .map(|v| v.as_number().unwrap().unwrap())
                    .collect();
                assert_eq!(resolved, vec![2.0, 3.0]);
            }
            other => panic!("expected a vector value, got {other:?}"),
        }
    }

    #[test]
    fn single_point_ranges_are_rejected() {
        let err = build_values(&ValueSpec::Range {
            from: SettingValue::Number(0.0),
            to: SettingValue::Number(1.0),
            n: 1,
        })
        .unwrap_err();
        assert_eq!(err.code(), "values-count");
    }

    #[test]
    fn nested_levels_enumerate_by_depth() {
        let node = SweepNode::from_json_str(
            r#"{
                "settings": [{"set": "model", "name": "a"}],
                "values": [1],
                "foreach": {
                    "settings": [{"set": "model", "name": "b"}],
                    "values": [2, 3]
                }
            }"#,
        )
        .unwrap();
        let depths = node.depths();
        assert_eq!(depths.len(), 2);
        assert_eq!(depths[1].settings[0].name, "b");
    }
}
