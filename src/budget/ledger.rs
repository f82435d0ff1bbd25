//! In-memory usage ledger.
//!
//! Counts calls per `(project, tool, window-kind, window-id)` bucket under a
//! single mutex, so the read-compare-increment of a charge is one critical
//! section and concurrent callers can never both slip under the limit.
//! Window rollover allocates a fresh bucket; stale buckets stay behind for
//! audit until [`UsageLedger::cleanup_old_usage_data`] sweeps them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::scope::{Scope, WindowKind};

/// Bucket identity: one counter per scope key, window kind, and window index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    project_id: String,
    tool_name: String,
    kind: WindowKind,
    window_id: i64,
}

impl BucketKey {
    fn new(scope: &Scope, kind: WindowKind, now: DateTime<Utc>) -> Self {
        Self {
            project_id: scope.project_id.clone(),
            tool_name: scope.tool_name.clone(),
            kind,
            window_id: kind.window_index(now),
        }
    }
}

/// Why a charge was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerDenial {
    /// The window that is full.
    pub window: WindowKind,
    /// Calls already counted in that window.
    pub used: u32,
    /// The limit that was hit.
    pub limit: u32,
    /// When the window rolls over.
    pub reset_at: DateTime<Utc>,
}

/// Read-only usage snapshot for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    /// Calls counted in the current window.
    pub used: u32,
    /// Calls left before the limit.
    pub remaining: u32,
    /// The effective limit.
    pub limit: u32,
    /// When the window rolls over.
    pub reset_at: DateTime<Utc>,
}

/// Thread-safe store of usage buckets.
#[derive(Debug, Default)]
pub struct UsageLedger {
    buckets: Mutex<HashMap<BucketKey, u32>>,
}

impl UsageLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one window and increment it if within the limit.
    pub fn check_and_increment(
        &self,
        scope: &Scope,
        kind: WindowKind,
        limit: u32,
    ) -> Result<(), LedgerDenial> {
        self.check_and_increment_at(scope, kind, limit, Utc::now())
    }

    /// [`check_and_increment`](Self::check_and_increment) with an injected clock.
    pub fn check_and_increment_at(
        &self,
        scope: &Scope,
        kind: WindowKind,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerDenial> {
        self.try_charge_at(scope, &[(kind, limit)], now)
    }

    /// Charge several windows all-or-nothing.
    ///
    /// Either every window has headroom and every counter is incremented,
    /// or the first full window (in the order given) is reported and no
    /// counter moves. The whole operation is one lock acquisition.
    pub fn try_charge(
        &self,
        scope: &Scope,
        charges: &[(WindowKind, u32)],
    ) -> Result<(), LedgerDenial> {
        self.try_charge_at(scope, charges, Utc::now())
    }

    /// [`try_charge`](Self::try_charge) with an injected clock.
    pub fn try_charge_at(
        &self,
        scope: &Scope,
        charges: &[(WindowKind, u32)],
        now: DateTime<Utc>,
    ) -> Result<(), LedgerDenial> {
        let mut buckets = self.lock();

        for (kind, limit) in charges {
            let key = BucketKey::new(scope, *kind, now);
            let used = buckets.get(&key).copied().unwrap_or(0);
            if used >= *limit {
                return Err(LedgerDenial {
                    window: *kind,
                    used,
                    limit: *limit,
                    reset_at: kind.next_reset(now),
                });
            }
        }

        for (kind, _) in charges {
            let key = BucketKey::new(scope, *kind, now);
            *buckets.entry(key).or_insert(0) += 1;
        }

        Ok(())
    }

    /// Read the current usage for one window without mutating anything.
    pub fn remaining(&self, scope: &Scope, kind: WindowKind, limit: u32) -> WindowUsage {
        self.remaining_at(scope, kind, limit, Utc::now())
    }

    /// [`remaining`](Self::remaining) with an injected clock.
    pub fn remaining_at(
        &self,
        scope: &Scope,
        kind: WindowKind,
        limit: u32,
        now: DateTime<Utc>,
    ) -> WindowUsage {
        let buckets = self.lock();
        let key = BucketKey::new(scope, kind, now);
        let used = buckets.get(&key).copied().unwrap_or(0);
        WindowUsage {
            used,
            remaining: limit.saturating_sub(used),
            limit,
            reset_at: kind.next_reset(now),
        }
    }

    /// Distinct tools the ledger has seen for a project, in any window.
    pub fn tools_seen(&self, project_id: &str) -> Vec<String> {
        let buckets = self.lock();
        let mut tools: Vec<String> = buckets
            .keys()
            .filter(|key| key.project_id == project_id)
            .map(|key| key.tool_name.clone())
            .collect();
        tools.sort();
        tools.dedup();
        tools
    }

    /// Remove buckets whose window ended before `now - retention`.
    ///
    /// The horizon is clamped per window kind to at least twice that
    /// window's length, so a short retention sweeps stale hourly buckets
    /// without touching yesterday's daily bucket. Returns the number of
    /// buckets removed.
    pub fn cleanup_old_usage_data(&self, retention: Duration) -> usize {
        self.cleanup_old_usage_data_at(retention, Utc::now())
    }

    /// [`cleanup_old_usage_data`](Self::cleanup_old_usage_data) with an
    /// injected clock.
    pub fn cleanup_old_usage_data_at(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let mut buckets = self.lock();
        let before = buckets.len();

        buckets.retain(|key, _| {
            let horizon = retention.max(key.kind.duration() * 2);
            key.kind.window_end(key.window_id) >= now - horizon
        });

        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, retained = buckets.len(), "cleaned up old usage buckets");
        }
        removed
    }

    /// Total buckets currently held, stale ones included.
    pub fn bucket_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BucketKey, u32>> {
        // A poisoned lock still holds a consistent map: every mutation is
        // a single insert/increment/retain.
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
