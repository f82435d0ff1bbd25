//! Retry state machine with bounded exponential backoff.
//!
//! The controller is pure: given the attempt number, the classified
//! failure, and the remaining deadline headroom, it decides the next step.
//! Driving the machine (executing the operation and sleeping) happens in
//! the rate limiter, through a scheduler-agnostic wait primitive, so no
//! lock is ever held across a wait.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::classifier::FailureKind;
use super::config::RetryConfig;

/// Fraction of the computed delay added as random jitter.
const JITTER_FRACTION: f64 = 0.25;

/// Where the retry loop currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to run attempt `n` (0-indexed).
    Attempt(u32),
    /// The operation succeeded; no state follows.
    Done,
    /// The operation failed for good; no state follows.
    Failed,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Sleep, then run the next attempt.
    Sleep(Duration),
    /// Retries are exhausted; fail with the best-known wait.
    GiveUp {
        /// Wait hint to surface to the caller, if one is known.
        retry_after: Option<Duration>,
    },
    /// The failure is not retryable; propagate it.
    Fatal,
    /// The caller's deadline leaves no room for the required wait.
    DeadlineExceeded,
}

/// Pure decision logic for the retry loop.
#[derive(Debug, Clone)]
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    /// Create a controller over a backoff policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The backoff policy in effect.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the retry following attempt `n`:
    /// `min(base_delay * 2^n, max_delay)` plus up to 25% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let exponential = self.config.base_delay.saturating_mul(factor);
        let capped = exponential.min(self.config.max_delay);
        capped + jitter(capped)
    }

    /// Decide the next step after attempt `attempt` failed with `kind`.
    ///
    /// `headroom` is the time left before the caller's deadline, if one
    /// was set. An explicit `retry_after` from the failure replaces the
    /// computed backoff (and is not jittered).
    pub fn next_step(
        &self,
        attempt: u32,
        kind: FailureKind,
        headroom: Option<Duration>,
    ) -> RetryStep {
        let retry_after = match kind {
            FailureKind::Fatal => return RetryStep::Fatal,
            FailureKind::Retryable { retry_after } => retry_after,
        };

        if attempt >= self.config.max_retries {
            return RetryStep::GiveUp { retry_after };
        }

        let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
        match headroom {
            Some(headroom) if delay >= headroom => RetryStep::DeadlineExceeded,
            _ => RetryStep::Sleep(delay),
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    delay.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_FRACTION))
}

/// Scheduler-agnostic "wait for this long" primitive.
///
/// The retry loop only ever waits through this trait, so the same state
/// machine runs under a multi-threaded runtime, a single-threaded test
/// runtime with a paused clock, or anything else that can sleep.
#[async_trait]
pub trait WaitPrimitive: Send + Sync {
    /// Wait for roughly `duration`.
    async fn wait(&self, duration: Duration);
}

/// Default wait primitive backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioWait;

#[async_trait]
impl WaitPrimitive for TokioWait {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(max_retries: u32) -> RetryController {
        RetryController::new(
            RetryConfig::new()
                .with_max_retries(max_retries)
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(60)),
        )
    }

    fn assert_near(delay: Duration, base_secs: f64) {
        let secs = delay.as_secs_f64();
        assert!(
            secs >= base_secs && secs <= base_secs * (1.0 + JITTER_FRACTION),
            "delay {secs}s outside [{base_secs}, {}]",
            base_secs * (1.0 + JITTER_FRACTION)
        );
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let ctl = controller(5);
        assert_near(ctl.backoff_delay(0), 1.0);
        assert_near(ctl.backoff_delay(1), 2.0);
        assert_near(ctl.backoff_delay(2), 4.0);
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let ctl = controller(5);
        // 2^10 seconds would be far past the 60s cap.
        assert_near(ctl.backoff_delay(10), 60.0);
        // Attempt numbers large enough to overflow the shift still cap.
        assert_near(ctl.backoff_delay(40), 60.0);
    }

    #[test]
    fn test_retryable_failure_sleeps_then_retries() {
        let ctl = controller(3);
        let step = ctl.next_step(0, FailureKind::Retryable { retry_after: None }, None);
        match step {
            RetryStep::Sleep(delay) => assert_near(delay, 1.0),
            other => panic!("expected sleep, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_retry_after_replaces_backoff() {
        let ctl = controller(3);
        // Attempt 2 would compute ~4s; the hint forces exactly 10s.
        let step = ctl.next_step(
            2,
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(10)),
            },
            None,
        );
        assert_eq!(step, RetryStep::Sleep(Duration::from_secs(10)));
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let ctl = controller(3);
        let step = ctl.next_step(
            3,
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(7)),
            },
            None,
        );
        assert_eq!(
            step,
            RetryStep::GiveUp {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn test_fatal_failure_never_sleeps() {
        let ctl = controller(3);
        assert_eq!(ctl.next_step(0, FailureKind::Fatal, None), RetryStep::Fatal);
    }

    #[test]
    fn test_deadline_headroom_blocks_the_sleep() {
        let ctl = controller(3);
        let step = ctl.next_step(
            0,
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(30)),
            },
            Some(Duration::from_secs(5)),
        );
        assert_eq!(step, RetryStep::DeadlineExceeded);

        // Plenty of headroom: the sleep goes ahead.
        let step = ctl.next_step(
            0,
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(30)),
            },
            Some(Duration::from_secs(300)),
        );
        assert_eq!(step, RetryStep::Sleep(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_wait_sleeps_for_the_duration() {
        let start = tokio::time::Instant::now();
        TokioWait.wait(Duration::from_secs(5)).await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
