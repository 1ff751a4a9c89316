//! Error types for the driftlog core.

use crate::storage::StoreError;
use thiserror::Error;

/// Errors surfaced by the supervisor, generators and retriever.
#[derive(Debug, Error)]
pub enum DriftError {
    /// Malformed or out-of-domain input (bad fraction, bad config)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A start request named no usable entity ids
    #[error("Entity id list is empty")]
    EmptyInput,

    /// The sample store is unreachable or failed a read
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single sample failed to serialize or deserialize
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A batch write failed
    #[error("Flush failed: {0}")]
    Flush(String),
}

impl DriftError {
    /// Creates a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::EmptyInput)
    }
}

impl From<StoreError> for DriftError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Write(msg) => Self::Flush(msg),
            StoreError::Unavailable(msg) | StoreError::Read(msg) => Self::StoreUnavailable(msg),
        }
    }
}

impl From<serde_json::Error> for DriftError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DriftError>;
