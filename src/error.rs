//! Centralized error handling for the datamedic engine.
//!
//! Every failure that crosses a public boundary is an [`EngineError`]. The
//! variants mirror the engine's failure taxonomy:
//!
//! - [`EngineError::Data`]: the input dataset is malformed or empty.
//! - [`EngineError::Schema`]: generator output could not be read as a plan.
//! - [`EngineError::Validation`]: the validator rejected a plan.
//! - [`EngineError::Execution`]: a validated plan failed at a specific step.
//! - [`EngineError::Fatal`]: something unexpected happened inside the engine.
//!
//! Analyzer degradation is deliberately absent: an analyzer that cannot run
//! returns [`crate::analyser::AnalyzerOutcome::NotApplicable`] instead.
//!
//! ## Structured reports
//!
//! Callers outside the crate never see a `Debug` dump or a backtrace. They get
//! an [`ErrorReport`], which is plain serialisable data:
//!
//! ```
//! use datamedic::error::{EngineError, ErrorKind};
//!
//! let report = EngineError::Data("dataset has no rows".to_owned()).report();
//! assert_eq!(report.kind, ErrorKind::DataError);
//! ```
//!
//! ## Panic boundary
//!
//! [`catch_fatal`] runs a closure and converts a panic into
//! [`EngineError::Fatal`]. The CLI wraps every command in it.

use crate::pipeline::contract::SchemaError;
use crate::pipeline::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Main error type for engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// I/O errors (reading datasets, plans, configs)
    Io(std::io::Error),

    /// Malformed or empty input dataset
    Data(String),

    /// Generator output is not a plan
    Schema(SchemaError),

    /// Plan rejected by the validator
    Validation(ValidationResult),

    /// A step failed while executing a validated plan
    Execution {
        step_index: usize,
        operation: String,
        message: String,
    },

    /// Configuration errors
    Config(String),

    /// Unexpected internal failure
    Fatal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Data(msg) => write!(f, "Data error: {msg}"),
            Self::Schema(err) => write!(f, "Schema error: {err}"),
            Self::Validation(result) => write!(
                f,
                "Validation failed with {} error(s): {}",
                result.errors.len(),
                result
                    .errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
            Self::Execution {
                step_index,
                operation,
                message,
            } => write!(
                f,
                "Execution error at step {} ({operation}): {message}",
                step_index + 1
            ),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Fatal(msg) => write!(f, "Internal engine error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Data(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for EngineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Data(err.to_string())
    }
}

impl From<SchemaError> for EngineError {
    fn from(err: SchemaError) -> Self {
        Self::Schema(err)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Category of a structured error, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DataError,
    SchemaError,
    ValidationError,
    ExecutionError,
    ConfigError,
    FatalEngineError,
}

/// Serialisable description of a failure, safe to hand to any caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    /// First validation issue code, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Data(_) => ErrorKind::DataError,
            Self::Schema(_) => ErrorKind::SchemaError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Execution { .. } => ErrorKind::ExecutionError,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Fatal(_) => ErrorKind::FatalEngineError,
        }
    }

    /// Convert into a structured report for callers.
    pub fn report(&self) -> ErrorReport {
        let (step_index, details) = match self {
            Self::Validation(result) => (
                None,
                result.errors.iter().map(ToString::to_string).collect(),
            ),
            Self::Execution { step_index, .. } => (Some(*step_index), Vec::new()),
            Self::Schema(err) => (None, err.excerpt.iter().cloned().collect()),
            _ => (None, Vec::new()),
        };

        let code = match self {
            Self::Validation(result) => result.errors.first().map(|e| e.code.to_string()),
            _ => None,
        };

        ErrorReport {
            kind: self.kind(),
            code,
            message: self.to_string(),
            step_index,
            details,
        }
    }

    fn with_prefix(self, prefix: &str) -> Self {
        match self {
            Self::Io(e) => Self::Data(format!("{prefix}: {e}")),
            Self::Data(msg) => Self::Data(format!("{prefix}: {msg}")),
            Self::Config(msg) => Self::Config(format!("{prefix}: {msg}")),
            Self::Fatal(msg) => Self::Fatal(format!("{prefix}: {msg}")),
            other => other,
        }
    }
}

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EngineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_prefix(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_prefix(&f()))
    }
}

/// Run `f`, turning a panic into [`EngineError::Fatal`].
pub fn catch_fatal<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(EngineError::Fatal(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Data("dataset has no rows".to_owned());
        assert_eq!(err.to_string(), "Data error: dataset has no rows");
    }

    #[test]
    fn test_execution_error_is_one_based_in_display() {
        let err = EngineError::Execution {
            step_index: 0,
            operation: "scale".to_owned(),
            message: "column 'x' not found".to_owned(),
        };
        assert!(err.to_string().contains("step 1 (scale)"));
        assert_eq!(err.report().step_index, Some(0));
        assert_eq!(err.report().kind, ErrorKind::ExecutionError);
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.csv",
        ));

        let result: Result<()> = result.context("Failed to read dataset");
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataError);
        assert!(err.to_string().contains("Failed to read dataset"));
    }

    #[test]
    fn test_catch_fatal_converts_panics() {
        let result: Result<()> = catch_fatal(|| panic!("boom"));
        let report = result.unwrap_err().report();
        assert_eq!(report.kind, ErrorKind::FatalEngineError);
        assert!(report.message.contains("boom"));
    }

    #[test]
    fn test_catch_fatal_passes_through_ok() {
        let result = catch_fatal(|| Ok(7));
        assert_eq!(result.unwrap(), 7);
    }
}
