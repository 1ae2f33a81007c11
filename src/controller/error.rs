//! Error types for the controllers.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;

use kube::core::ParseExpressionError;
use thiserror::Error;

/// Base delay for the first retry.
const BASE_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Upper bound for any single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(1000);

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A role selector could not be converted into a label selector query
    #[error("Invalid role selector: {0}")]
    InvalidSelector(#[from] ParseExpressionError),

    /// The informer cache could not serve a lookup
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if this error should be retried
    ///
    /// Everything but a vanished object is retried: a malformed selector
    /// cannot be told apart from a transient failure.
    pub fn is_retryable(&self) -> bool {
        !self.is_not_found()
    }

    /// Get the requeue delay for the given number of previous failures
    pub fn requeue_after_with_retry_count(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        BASE_RETRY_DELAY
            .checked_mul(factor)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
