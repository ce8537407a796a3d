//! Custom error types for the reaction preprocessing pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Three kinds
//! matter for control flow:
//!
//! - [`PreprocessingError::MalformedReaction`]: a single record could not be
//!   parsed. Stages drop the record and count it.
//! - [`PreprocessingError::InvalidConfiguration`]: fatal, raised before any
//!   stage runs.
//! - [`PreprocessingError::StageExecution`]: a stage failed; the orchestrator
//!   stops and reports the stage name.
//!
//! Errors are serializable as `{code, message}` so they can be written into
//! JSON run summaries.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::toolkit::ToolkitError;

/// The main error type for the preprocessing pipeline.
#[derive(Error, Debug)]
pub enum PreprocessingError {
    /// Pipeline was cancelled by user.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// A reaction string could not be split into well-formed molecules.
    #[error("Malformed reaction '{reaction}': {reason}")]
    MalformedReaction { reaction: String, reason: String },

    /// Out-of-range parameter or unresolvable path.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A stage failed; wraps the underlying cause.
    #[error("Stage '{stage}' failed: {source}")]
    StageExecution {
        stage: String,
        #[source]
        source: Box<PreprocessingError>,
    },

    /// More malformed records than the configured strict threshold allows.
    #[error("{count} malformed reactions exceed the limit of {limit}")]
    MalformedThresholdExceeded { count: usize, limit: usize },

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A column held a value of an unexpected type.
    #[error("Column '{column}' is expected to contain {expected} values (found '{found}')")]
    InvalidColumnValue {
        column: String,
        expected: String,
        found: String,
    },

    /// The chemistry toolkit rejected an input.
    #[error("Toolkit error: {0}")]
    Toolkit(#[from] ToolkitError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PreprocessingError>,
    },
}

impl PreprocessingError {
    /// Build a malformed-reaction error.
    pub fn malformed(reaction: impl Into<String>, reason: impl Into<String>) -> Self {
        PreprocessingError::MalformedReaction {
            reaction: reaction.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error as the failure of the named stage.
    ///
    /// Errors that already carry a stage name are returned unchanged.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        match self {
            e @ PreprocessingError::StageExecution { .. } => e,
            e => PreprocessingError::StageExecution {
                stage: stage.into(),
                source: Box::new(e),
            },
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PreprocessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::MalformedReaction { .. } => "MALFORMED_REACTION",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::StageExecution { .. } => "STAGE_EXECUTION",
            Self::MalformedThresholdExceeded { .. } => "MALFORMED_THRESHOLD_EXCEEDED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidColumnValue { .. } => "INVALID_COLUMN_VALUE",
            Self::Toolkit(_) => "TOOLKIT_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Name of the failing stage, if this error came out of a stage.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageExecution { stage, .. } => Some(stage),
            Self::WithContext { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::StageExecution { source, .. } | Self::WithContext { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    /// Check if this error only affects a single record.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::MalformedReaction { .. })
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PreprocessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PreprocessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for preprocessing operations.
pub type Result<T> = std::result::Result<T, PreprocessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PreprocessingError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PreprocessingError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(PreprocessingError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            PreprocessingError::malformed("A>>", "empty products").error_code(),
            "MALFORMED_REACTION"
        );
        assert_eq!(
            PreprocessingError::InvalidConfiguration("ratio".to_string()).error_code(),
            "INVALID_CONFIGURATION"
        );
    }

    #[test]
    fn test_in_stage_wraps_once() {
        let error = PreprocessingError::ColumnNotFound("rxn".to_string())
            .in_stage("standardize")
            .in_stage("split");
        assert_eq!(error.stage(), Some("standardize"));
        assert_eq!(error.error_code(), "STAGE_EXECUTION");
        assert!(error.to_string().contains("rxn"));
    }

    #[test]
    fn test_is_cancelled_through_wrappers() {
        assert!(PreprocessingError::Cancelled.is_cancelled());
        assert!(PreprocessingError::Cancelled.in_stage("split").is_cancelled());
        assert!(!PreprocessingError::ColumnNotFound("x".into()).is_cancelled());
    }

    #[test]
    fn test_error_serialization() {
        let error = PreprocessingError::ColumnNotFound("rxn".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("rxn"));
    }

    #[test]
    fn test_with_context() {
        let error =
            PreprocessingError::ColumnNotFound("test".to_string()).with_context("During import");
        assert!(error.to_string().contains("During import"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
