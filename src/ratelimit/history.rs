//! Sliding request history per provider.
//!
//! Timestamps are monotonic [`tokio::time::Instant`]s: sliding 60s/3600s
//! windows care about elapsed time, not calendar time, and tokio instants
//! follow the paused clock in timing tests. Prune, count, compare, and
//! append all happen inside one critical section; a throttled call is
//! *not* recorded, because it never left the process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use super::config::ProviderRateConfig;

/// Sliding minute window.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);
/// Sliding hour window; also the retention horizon for history entries.
pub const HOUR_WINDOW: Duration = Duration::from_secs(3_600);

/// Returned when a provider's ceiling is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    /// Time until the oldest entry inside the offending window exits it.
    pub wait_for: Duration,
}

/// Per-provider log of recent outbound attempts.
#[derive(Debug, Default)]
pub struct RequestHistory {
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RequestHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current attempt if the provider's ceilings allow it.
    pub fn record_and_check(
        &self,
        provider: &str,
        rate: ProviderRateConfig,
    ) -> Result<(), Throttle> {
        self.record_and_check_at(provider, rate, Instant::now())
    }

    /// [`record_and_check`](Self::record_and_check) with an injected clock.
    pub fn record_and_check_at(
        &self,
        provider: &str,
        rate: ProviderRateConfig,
        now: Instant,
    ) -> Result<(), Throttle> {
        let mut map = self.lock();
        let entries = map.entry(provider.to_string()).or_default();

        // Entries past the largest window can never count again.
        while entries
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= HOUR_WINDOW)
        {
            entries.pop_front();
        }

        // Hour ceiling first, mirroring the order callers observe.
        let in_hour = entries.len() as u32;
        if in_hour >= rate.requests_per_hour {
            let wait_for = entries
                .front()
                .map(|oldest| window_exit(*oldest, HOUR_WINDOW, now))
                .unwrap_or_default();
            warn!(
                provider,
                in_hour,
                limit = rate.requests_per_hour,
                wait_secs = wait_for.as_secs_f64(),
                "hourly request ceiling reached"
            );
            return Err(Throttle { wait_for });
        }

        let in_minute = entries
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < MINUTE_WINDOW)
            .count() as u32;
        if in_minute >= rate.requests_per_minute {
            let wait_for = entries
                .iter()
                .find(|t| now.saturating_duration_since(**t) < MINUTE_WINDOW)
                .map(|oldest| window_exit(*oldest, MINUTE_WINDOW, now))
                .unwrap_or_default();
            warn!(
                provider,
                in_minute,
                limit = rate.requests_per_minute,
                wait_secs = wait_for.as_secs_f64(),
                "per-minute request ceiling reached"
            );
            return Err(Throttle { wait_for });
        }

        entries.push_back(now);
        Ok(())
    }

    /// How many attempts the history holds for a provider inside `window`.
    pub fn in_window_at(&self, provider: &str, window: Duration, now: Instant) -> usize {
        let map = self.lock();
        map.get(provider)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|t| now.saturating_duration_since(**t) < window)
                    .count()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        // A poisoned lock still holds a consistent map: every mutation is
        // a push, pop, or entry insertion.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time until `entry` leaves a sliding `window`, measured at `now`.
fn window_exit(entry: Instant, window: Duration, now: Instant) -> Duration {
    (entry + window).saturating_duration_since(now)
}
