//! Structured error types shared across simfarm crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`SimError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (job names, paths, counters, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for the simfarm workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SimError {
    /// Job tracking and status-file parsing errors.
    #[error("jobs error: {0}")]
    Jobs(ErrorInfo),
    /// Settings model errors (unknown coordinates, bad values).
    #[error("settings error: {0}")]
    Settings(ErrorInfo),
    /// Sweep map declaration errors.
    #[error("sweep error: {0}")]
    Sweep(ErrorInfo),
    /// Search and refinement errors.
    #[error("search error: {0}")]
    Search(ErrorInfo),
    /// Restricted expression evaluation errors.
    #[error("eval error: {0}")]
    Eval(ErrorInfo),
    /// Remote transport errors.
    #[error("remote error: {0}")]
    Remote(ErrorInfo),
    /// Simulation cache errors.
    #[error("cache error: {0}")]
    Cache(ErrorInfo),
    /// Pause-state persistence errors.
    #[error("state error: {0}")]
    State(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl SimError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SimError::Jobs(info)
            | SimError::Settings(info)
            | SimError::Sweep(info)
            | SimError::Search(info)
            | SimError::Eval(info)
            | SimError::Remote(info)
            | SimError::Cache(info)
            | SimError::State(info)
            | SimError::Serde(info) => info,
        }
    }

    /// Returns the stable machine readable code of the error.
    pub fn code(&self) -> &str {
        &self.info().code
    }
}
