use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to callers of the retrieval engine.
///
/// Internal plumbing works with `anyhow`; everything that crosses the
/// retriever boundary is mapped onto one of these kinds.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Encoder failure: {0}")]
    EncoderFailure(String),

    #[error("Timed out after {after:?} during {operation}")]
    Timeout { operation: &'static str, after: Duration },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Wrap an `anyhow` error from a backend, keeping the whole context chain.
    pub fn operation(err: &anyhow::Error) -> Self {
        Self::Operation(format!("{err:#}"))
    }

    pub fn encoder(err: &anyhow::Error) -> Self {
        Self::EncoderFailure(format!("{err:#}"))
    }

    pub fn unavailable(err: &anyhow::Error) -> Self {
        Self::IndexUnavailable(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
