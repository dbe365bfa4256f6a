//! Error types for the regression workflow

use std::fmt;
use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Distinguishes the ways a data source or sink can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceIoKind {
    /// Object or file does not exist
    NotFound,
    /// Credentials lack access to the object
    PermissionDenied,
    /// Bytes could not be decoded with the requested encoding, or the CSV is malformed
    Decode,
    /// The object exists but has no content (only raised in strict mode)
    EmptyContent,
    /// Network-level failure talking to the storage service
    Transport,
    /// Any other error reported by the storage service
    Service,
}

impl fmt::Display for SourceIoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceIoKind::NotFound => "not found",
            SourceIoKind::PermissionDenied => "permission denied",
            SourceIoKind::Decode => "decode error",
            SourceIoKind::EmptyContent => "empty content",
            SourceIoKind::Transport => "transport error",
            SourceIoKind::Service => "service error",
        };
        f.write_str(s)
    }
}

/// Main error type for the workflow
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Source I/O error ({kind}) at '{location}': {message}")]
    SourceIo {
        kind: SourceIoKind,
        location: String,
        message: String,
    },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Build a source I/O error
    pub fn source_io(
        kind: SourceIoKind,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PipelineError::SourceIo {
            kind,
            location: location.into(),
            message: message.into(),
        }
    }

    /// Build an invalid hyperparameter error
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// The source I/O kind, if this is a source error
    pub fn source_kind(&self) -> Option<SourceIoKind> {
        match self {
            PipelineError::SourceIo { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataIntegrity(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeMismatch {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
