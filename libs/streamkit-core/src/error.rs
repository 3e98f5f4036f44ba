//! Error types for streamkit-core.
//!
//! `StreamError` is the typed error every fallible core operation returns.
//! `Status` is the coarse status-code view described in SPEC_FULL.md §6 —
//! client code that just wants "did it work" can match on `Status` without
//! pulling apart the error payload.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("context not initialized")]
    Uninitialized,

    #[error("operation timed out")]
    Timeout,

    #[error("context shut down")]
    Shutdown,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("plugin error: {0}")]
    Plugin(#[from] anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Result type that uses StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Coarse status codes surfaced to client code (SPEC_FULL.md §6).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[error("success")]
    Success,
    #[error("context not initialized")]
    Uninitialized,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("operation timed out")]
    Timeout,
    #[error("internal error")]
    InternalError,
    #[error("context shut down")]
    Shutdown,
}

impl StreamError {
    pub fn status(&self) -> Status {
        match self {
            StreamError::InvalidParameter(_) => Status::InvalidParameter,
            StreamError::InvalidOperation(_) => Status::InvalidOperation,
            StreamError::Uninitialized => Status::Uninitialized,
            StreamError::Timeout => Status::Timeout,
            StreamError::Shutdown => Status::Shutdown,
            StreamError::InternalError(_) => Status::InternalError,
            StreamError::Plugin(_) => Status::InternalError,
            StreamError::Io(_) => Status::InternalError,
            StreamError::Configuration(_) => Status::InvalidParameter,
        }
    }
}
