//! Engine and store error types.
//!
//! Validation failures are rejected synchronously and never mutate state.
//! [StoreError::Conflict] is an internal retry signal: the engine retries a
//! bounded number of times and then surfaces [EngineError::StoreUnavailable],
//! so callers only ever see the public taxonomy.

use thiserror::Error;

/// Public error taxonomy of the lockout engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed client identity; the request is rejected with no state change.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Malformed event type; the request is rejected with no state change.
    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    /// Persistence layer unreachable, timed out, or conflicted past the retry bound.
    #[error("lockout store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Errors surfaced by [crate::store::LockoutStore] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying persistence failure (I/O, timeout, poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic-concurrency conflict: the record changed since it was read.
    #[error("concurrent modification conflict")]
    Conflict,
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::Conflict => {
                EngineError::StoreUnavailable("concurrent modification conflict".to_string())
            }
        }
    }
}
