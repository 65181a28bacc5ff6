use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for Draftline.
#[derive(Error, Debug)]
pub enum AppError {
    /// A provider HTTP call failed (network, timeout at the wire level,
    /// or a non-success status). Carries whatever the transport saw.
    #[error("transport error from '{source_name}': {message}")]
    Transport {
        source_name: String,
        status: Option<u16>,
        message: String,
        /// Raw response body, when one was read. Kept for diagnostics,
        /// never parsed further up the stack.
        body: Option<String>,
    },

    /// Authentication with a provider failed. Never retried.
    #[error("authentication failed for '{source_name}': {reason}")]
    Auth { source_name: String, reason: String },

    /// A provider answered 429.
    #[error("rate limited by '{source_name}'")]
    RateLimited { source_name: String },

    /// A provider call exceeded the transport timeout.
    #[error("request to '{source_name}' timed out after {seconds} seconds")]
    Timeout { source_name: String, seconds: u64 },

    /// Fewer sources succeeded than the configured quorum, and no stale
    /// merged result was available to fall back on.
    #[error("quorum not met: {successful} of {required} required sources succeeded")]
    QuorumNotMet { successful: usize, required: usize },

    /// Quorum was met but the union of all source results was empty.
    /// Treated as an anomaly, not a valid empty collection.
    #[error("quorum met but no addition records were returned by any source")]
    NoData,

    /// The named operation was skipped because its circuit breaker is open.
    #[error("circuit breaker '{operation}' is open, retry in {}s", retry_after.as_secs())]
    BreakerOpen {
        operation: String,
        retry_after: Duration,
    },

    /// A pipeline run was requested while another run is active.
    #[error("a pipeline run is already in progress")]
    PipelineBusy,

    /// A record or summary failed shape validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimited { .. } | AppError::Timeout { .. } => true,
            AppError::Transport { status, .. } => match status {
                // No status at all means the request never completed
                // (connect/reset), so another attempt can succeed.
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }

    /// Returns true if this error should count against a circuit breaker.
    ///
    /// Auth and validation failures are deterministic; repeating them
    /// tells the breaker nothing about provider health.
    pub fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. } | AppError::Timeout { .. }
        ) || match self {
            AppError::Transport { status, .. } => {
                matches!(status, None | Some(429)) || matches!(status, Some(code) if *code >= 500)
            }
            _ => false,
        }
    }
}
