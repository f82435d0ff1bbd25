//! Provider request-rate throttling and resilient retry.
//!
//! Outbound calls pass through two layers. The *throttle gate* keeps a
//! sliding log of recent attempts per provider and delays calls that would
//! break the provider's per-minute or per-hour ceiling. The *retry
//! controller* handles rejections the provider itself signals, with
//! bounded exponential backoff and explicit retry-after hints.
//!
//! # Overview
//!
//! - **ProviderRateConfig / RetryConfig**: ceilings and backoff policy
//! - **RequestHistory**: atomic sliding-window accounting per provider
//! - **FailureClassifier**: retryable vs. fatal provider failures
//! - **RetryController**: the backoff state machine
//! - **RateLimiter**: wraps an async operation with all of the above

mod classifier;
mod config;
mod history;
mod limiter;
mod retry;

pub use classifier::{FailureClassifier, FailureKind};
pub use config::{ProviderRateConfig, RetryConfig};
pub use history::{RequestHistory, Throttle, HOUR_WINDOW, MINUTE_WINDOW};
pub use limiter::RateLimiter;
pub use retry::{RetryController, RetryState, RetryStep, TokioWait, WaitPrimitive};
