//! Error types for the Tessera format crate.

use thiserror::Error;

/// Errors that can occur when planning windows or reading/writing containers.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;
