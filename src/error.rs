//! Error taxonomy for the governor.
//!
//! Budget and rate exhaustion are expected control flow, surfaced as typed
//! `Result` errors so callers have to handle them; only configuration
//! problems (at startup) and fatal provider failures are truly exceptional.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::scope::{Scope, WindowKind};

/// Result type for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Errors surfaced to callers of the governor.
#[derive(Error, Debug)]
pub enum GovernorError {
    /// A usage quota was exhausted. Raised before the guarded operation
    /// runs; the call can be retried after `reset_at`.
    #[error("{window} budget exceeded for {scope}: {used}/{limit} calls used, resets at {reset_at}")]
    BudgetExceeded {
        /// Scope whose quota was exhausted.
        scope: Scope,
        /// Which window ran out.
        window: WindowKind,
        /// Calls already charged in that window.
        used: u32,
        /// The effective limit for that window.
        limit: u32,
        /// Start of the next window.
        reset_at: DateTime<Utc>,
    },

    /// Provider request-rate ceilings could not be satisfied, even after
    /// retries. Carries the best-known wait time.
    #[error("provider rate limit exhausted; retry after {retry_after:?}")]
    RateLimited {
        /// Best-known time until the provider will admit another call.
        retry_after: Duration,
    },

    /// A caller-imposed deadline elapsed while waiting between retries.
    /// Distinct from [`GovernorError::RateLimited`]: the provider might
    /// have admitted a later attempt, but the caller ran out of time.
    #[error("deadline exceeded after {elapsed:?} while retrying")]
    DeadlineExceeded {
        /// Time spent in the call when the deadline cut it off.
        elapsed: Duration,
    },

    /// Malformed limit tables or retry settings. Only ever raised at
    /// setup time, never mid-call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying provider call failed with a non-retryable error.
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Failure reported by a governed operation.
///
/// Callers wrap whatever their client library returns into this shape so
/// the failure classifier can decide between retry and propagation.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ProviderError {
    /// Human-readable failure message from the provider.
    pub message: String,
    /// HTTP status code, when the transport exposes one.
    pub status: Option<u16>,
    /// Explicit wait hint from the provider (e.g. a `retry-after` header).
    pub retry_after: Option<Duration>,
    /// Marks failures that must never be retried (bad credentials,
    /// malformed requests).
    pub fatal: bool,
}

impl ProviderError {
    /// Create a provider error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retry_after: None,
            fatal: false,
        }
    }

    /// Attach the HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach an explicit wait hint. A hint marks the failure retryable
    /// and takes precedence over computed backoff.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Mark the failure fatal: it bypasses retry entirely.
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}
