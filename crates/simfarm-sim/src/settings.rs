//! Strongly typed settings model.
//!
//! Settings are partitioned into named, ordered sets; each setting carries a
//! value that may be a deferred `((expr))` arithmetic string resolved only
//! when the setting is rendered or compared.

use serde::{Deserialize, Serialize};
use simfarm_core::errors::{ErrorInfo, SimError};
use simfarm_core::expr::{self, Expr, Value};

/// Default pattern used to render a setting on a command line.
pub const DEFAULT_SETTING_PATTERN: &str = "-{name} {value}";

/// Value of a single setting.
///
/// A string of the form `((expr))` is a deferred arithmetic expression; it is
/// kept symbolic until [`SettingValue::resolve`] so interpolated sweep values
/// lose no precision before they are consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean flag.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// String value, possibly a deferred expression.
    Str(String),
    /// List of values.
    List(Vec<SettingValue>),
}

impl SettingValue {
    /// Resolves deferred expressions and numeric strings to concrete values.
    ///
    /// Plain numeric strings are cast to numbers; `((expr))` strings are
    /// parsed and evaluated through the restricted evaluator; everything else
    /// passes through unchanged. Lists resolve element-wise.
    pub fn resolve(&self) -> Result<SettingValue, SimError> {
        match self {
            SettingValue::Str(s) => {
                let trimmed = s.trim();
                if let Ok(number) = trimmed.parse::<f64>() {
                    return Ok(SettingValue::Number(number));
                }
                if let Some(inner) = deferred_expression(trimmed) {
                    let parsed = Expr::parse(inner, false)?;
                    return Ok(value_to_setting(expr::eval(&parsed, &[])?));
                }
                Ok(SettingValue::Str(trimmed.to_string()))
            }
            SettingValue::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(item.resolve()?);
                }
                Ok(SettingValue::List(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolves the value and returns its numeric content, if any.
    pub fn as_number(&self) -> Result<Option<f64>, SimError> {
        Ok(match self.resolve()? {
            SettingValue::Number(n) => Some(n),
            SettingValue::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            _ => None,
        })
    }

    /// Renders the resolved value as a command-line fragment.
    pub fn render(&self) -> Result<String, SimError> {
        Ok(match self.resolve()? {
            SettingValue::Number(n) => format_number(n),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Str(s) => s,
            SettingValue::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(item.render()?);
                }
                parts.join(" ")
            }
        })
    }
}

/// Returns the inner expression when the string is a `((expr))` form.
fn deferred_expression(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("((")?;
    let inner = inner.strip_suffix("))")?;
    Some(inner)
}

fn value_to_setting(value: Value) -> SettingValue {
    match value {
        Value::Number(n) => SettingValue::Number(n),
        Value::Bool(b) => SettingValue::Bool(b),
        Value::Str(s) => SettingValue::Str(s),
        Value::List(items) => SettingValue::List(items.into_iter().map(value_to_setting).collect()),
    }
}

/// Formats a number without a trailing `.0` when it is integral.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One named setting inside a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Name of the setting.
    pub name: String,
    /// Current value.
    pub value: SettingValue,
    /// Render pattern overriding [`DEFAULT_SETTING_PATTERN`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Excluded settings do not participate in the fingerprint or rendering.
    #[serde(default)]
    pub exclude: bool,
}

impl Setting {
    /// Creates a setting with the default pattern.
    pub fn new(name: impl Into<String>, value: SettingValue) -> Self {
        Self {
            name: name.into(),
            value,
            pattern: None,
            exclude: false,
        }
    }

    /// Renders the setting according to its pattern.
    pub fn render(&self) -> Result<String, SimError> {
        let pattern = self.pattern.as_deref().unwrap_or(DEFAULT_SETTING_PATTERN);
        Ok(pattern
            .replace("{name}", &self.name)
            .replace("{value}", &self.value.render()?))
    }
}

/// Named, ordered group of settings; sets may repeat under an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSet {
    /// Name of the set (e.g. "model", "solver").
    pub name: String,
    /// Repetition index of the set.
    #[serde(default)]
    pub index: usize,
    /// Ordered settings of this set occurrence.
    pub settings: Vec<Setting>,
}

/// Coordinates of one setting: set name, set occurrence, setting name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingCoordinate {
    /// Name of the set.
    pub set: String,
    /// Occurrence index of the set, defaults to the first.
    #[serde(default)]
    pub set_index: usize,
    /// Name of the setting within the set.
    pub name: String,
}

impl SettingCoordinate {
    /// Convenience constructor addressing the first occurrence of a set.
    pub fn new(set: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            set_index: 0,
            name: name.into(),
        }
    }
}

/// Error for a coordinate that does not address an existing setting.
pub fn unknown_setting_error(coords: &SettingCoordinate) -> SimError {
    SimError::Settings(
        ErrorInfo::new("unknown-setting", "no setting matches the coordinates")
            .with_context("set", coords.set.clone())
            .with_context("set_index", coords.set_index.to_string())
            .with_context("name", coords.name.clone()),
    )
}
