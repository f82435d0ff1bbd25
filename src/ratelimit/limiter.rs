//! Rate-limited, retrying execution of provider calls.
//!
//! [`RateLimiter::call`] wraps an async operation with two layers:
//! a local throttle gate (the request history checked against the
//! provider's ceilings, with one bounded wait-and-recheck) and the retry
//! controller for provider-side rejections. Sleeps never hold a lock, and
//! counters only move at attempt boundaries, so cancelling a caller
//! mid-sleep leaves the history consistent.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{GovernorError, GovernorResult, ProviderError};

use super::classifier::FailureClassifier;
use super::config::{ProviderRateConfig, RetryConfig};
use super::history::RequestHistory;
use super::retry::{RetryController, RetryState, RetryStep, TokioWait, WaitPrimitive};

/// Throttles and retries provider calls.
pub struct RateLimiter {
    rates: HashMap<String, ProviderRateConfig>,
    classifiers: HashMap<String, FailureClassifier>,
    history: RequestHistory,
    retry: RetryController,
    waiter: Box<dyn WaitPrimitive>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rates", &self.rates)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter over configured provider ceilings and classifiers.
    ///
    /// Providers without an entry fall back to the built-in rate table and
    /// the preset classifier for their name.
    pub fn new(
        rates: HashMap<String, ProviderRateConfig>,
        classifiers: HashMap<String, FailureClassifier>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            rates: lowercase_keys(rates),
            classifiers: lowercase_keys(classifiers),
            history: RequestHistory::new(),
            retry: RetryController::new(retry_config),
            waiter: Box::new(TokioWait),
        }
    }

    /// Replace the wait primitive, e.g. to drive waits from a custom
    /// scheduler or to observe them in tests.
    pub fn with_waiter(mut self, waiter: Box<dyn WaitPrimitive>) -> Self {
        self.waiter = waiter;
        self
    }

    /// The effective ceilings for a provider.
    pub fn rate_for(&self, provider: &str) -> ProviderRateConfig {
        self.rates
            .get(&provider.to_lowercase())
            .copied()
            .unwrap_or_else(|| ProviderRateConfig::builtin_for(provider))
    }

    /// The classifier used for a provider's failures.
    pub fn classifier_for(&self, provider: &str) -> FailureClassifier {
        self.classifiers
            .get(&provider.to_lowercase())
            .cloned()
            .unwrap_or_else(|| FailureClassifier::for_provider(provider))
    }

    /// Execute `op` under the provider's ceilings, retrying classified
    /// rate-limit rejections with bounded backoff.
    pub async fn call<T, F, Fut>(&self, provider: &str, op: F) -> GovernorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.call_inner(provider, None, op).await
    }

    /// [`call`](Self::call) with an overall deadline. Once the deadline
    /// is reached no further attempt is scheduled and the call fails with
    /// [`GovernorError::DeadlineExceeded`].
    pub async fn call_with_deadline<T, F, Fut>(
        &self,
        provider: &str,
        deadline: Instant,
        op: F,
    ) -> GovernorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.call_inner(provider, Some(deadline), op).await
    }

    async fn call_inner<T, F, Fut>(
        &self,
        provider: &str,
        deadline: Option<Instant>,
        mut op: F,
    ) -> GovernorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let rate = self.rate_for(provider);
        let classifier = self.classifier_for(provider);

        let mut state = RetryState::Attempt(0);
        let mut outcome: Option<GovernorResult<T>> = None;

        while let RetryState::Attempt(attempt) = state {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                outcome = Some(Err(GovernorError::DeadlineExceeded {
                    elapsed: started.elapsed(),
                }));
                state = RetryState::Failed;
                continue;
            }

            if let Err(err) = self.admit(provider, rate, deadline, started).await {
                outcome = Some(Err(err));
                state = RetryState::Failed;
                continue;
            }

            match op().await {
                Ok(value) => {
                    outcome = Some(Ok(value));
                    state = RetryState::Done;
                }
                Err(err) => {
                    let kind = classifier.classify(&err);
                    let headroom = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                    match self.retry.next_step(attempt, kind, headroom) {
                        RetryStep::Sleep(delay) => {
                            info!(
                                provider,
                                attempt,
                                delay_secs = delay.as_secs_f64(),
                                error = %err,
                                "retryable provider failure; backing off"
                            );
                            self.waiter.wait(delay).await;
                            state = RetryState::Attempt(attempt + 1);
                        }
                        RetryStep::GiveUp { retry_after } => {
                            let retry_after =
                                retry_after.unwrap_or_else(|| self.retry.backoff_delay(attempt));
                            outcome = Some(Err(GovernorError::RateLimited { retry_after }));
                            state = RetryState::Failed;
                        }
                        RetryStep::Fatal => {
                            outcome = Some(Err(GovernorError::Provider(err)));
                            state = RetryState::Failed;
                        }
                        RetryStep::DeadlineExceeded => {
                            outcome = Some(Err(GovernorError::DeadlineExceeded {
                                elapsed: started.elapsed(),
                            }));
                            state = RetryState::Failed;
                        }
                    }
                }
            }
        }

        match outcome {
            Some(result) => result,
            // Unreachable: every transition out of Attempt stores an outcome.
            None => Err(GovernorError::RateLimited {
                retry_after: Duration::ZERO,
            }),
        }
    }

    /// Pass one attempt through the throttle gate.
    ///
    /// On a local ceiling, waits `wait_for` (capped at the retry policy's
    /// `max_delay`), then re-checks once; a second refusal surfaces as
    /// [`GovernorError::RateLimited`] with the remaining wait.
    async fn admit(
        &self,
        provider: &str,
        rate: ProviderRateConfig,
        deadline: Option<Instant>,
        started: Instant,
    ) -> GovernorResult<()> {
        let throttle = match self.history.record_and_check(provider, rate) {
            Ok(()) => return Ok(()),
            Err(throttle) => throttle,
        };

        let wait = throttle.wait_for.min(self.retry.config().max_delay);
        if deadline.is_some_and(|d| Instant::now() + wait >= d) {
            return Err(GovernorError::DeadlineExceeded {
                elapsed: started.elapsed(),
            });
        }

        debug!(
            provider,
            wait_secs = wait.as_secs_f64(),
            "request ceiling met; waiting for the window to open"
        );
        self.waiter.wait(wait).await;

        match self.history.record_and_check(provider, rate) {
            Ok(()) => Ok(()),
            Err(still) => Err(GovernorError::RateLimited {
                retry_after: still.wait_for,
            }),
        }
    }
}

fn lowercase_keys<V>(map: HashMap<String, V>) -> HashMap<String, V> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}
