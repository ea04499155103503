//! Error types for the Tessera codec crate.

use tessera_format::FormatError;
use thiserror::Error;

/// Failure reported by a [`crate::CodecTransform`] implementation.
///
/// The engine never retries these; they reach the caller unchanged inside
/// [`CodecError::TransformFailure`].
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Unexpected tensor shape: {0}")]
    ShapeMismatch(String),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Transform failure: {0}")]
    TransformFailure(#[from] TransformError),

    #[error(transparent)]
    Format(FormatError),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FormatError> for CodecError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::InvalidConfiguration(msg) => CodecError::InvalidConfiguration(msg),
            other => CodecError::Format(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
