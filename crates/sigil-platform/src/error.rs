//! Common error types for sigil-platform.

use thiserror::Error;

/// Platform-level errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("injection failed: {0}")]
    InjectionFailed(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("input listener failed: {0}")]
    Listener(String),
    #[error("display query failed: {0}")]
    Display(String),
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
