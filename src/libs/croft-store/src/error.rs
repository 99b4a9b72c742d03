//! Store error taxonomy

use thiserror::Error;

/// Errors surfaced by cache operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested row does not exist (a cache miss, not a failure)
    #[error("not found")]
    NotFound,

    /// The backend could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the operation failed
    #[error("store error: {0}")]
    Backend(String),

    /// The backend did not answer within its deadline
    #[error("store operation timed out")]
    Timeout,
}

/// Result alias used throughout the crate
pub type StoreResult<T> = Result<T, StoreError>;
