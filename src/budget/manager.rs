//! Budget admission and introspection.
//!
//! [`BudgetManager`] composes the limit table with the usage ledger. A
//! successful check charges both the hourly and the daily window before the
//! guarded operation runs, and the charge stays even if the operation later
//! fails: budget measures attempts, not successes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::budget::ledger::UsageLedger;
use crate::budget::limits::LimitTable;
use crate::budget::report::{BudgetReport, ToolBudget};
use crate::error::{GovernorError, GovernorResult};
use crate::scope::{Scope, WindowKind};

/// Default retention horizon for stale usage buckets.
pub fn default_usage_retention() -> Duration {
    Duration::days(2)
}

/// Enforces per-scope budgets over the hourly and daily windows.
#[derive(Debug)]
pub struct BudgetManager {
    limits: Arc<LimitTable>,
    ledger: UsageLedger,
}

impl BudgetManager {
    /// Create a manager over an immutable limit table.
    pub fn new(limits: Arc<LimitTable>) -> Self {
        Self {
            limits,
            ledger: UsageLedger::new(),
        }
    }

    /// Check the scope against both windows and charge them atomically.
    ///
    /// If either window is full the whole call is rejected and neither
    /// counter moves. On success both counters are already incremented
    /// when this returns (reservation-first; no refund on downstream
    /// failure).
    pub fn check_and_update_budget(&self, scope: &Scope) -> GovernorResult<()> {
        self.check_and_update_budget_at(scope, Utc::now())
    }

    /// [`check_and_update_budget`](Self::check_and_update_budget) with an
    /// injected clock.
    pub fn check_and_update_budget_at(
        &self,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> GovernorResult<()> {
        let limit = self
            .limits
            .resolve(&scope.tool_name, scope.prompt_id.as_deref());
        let charges = [
            (WindowKind::Hourly, limit.hourly_limit),
            (WindowKind::Daily, limit.daily_limit),
        ];

        match self.ledger.try_charge_at(scope, &charges, now) {
            Ok(()) => {
                debug!(
                    scope = %scope,
                    hourly_limit = limit.hourly_limit,
                    daily_limit = limit.daily_limit,
                    "budget charged"
                );
                Ok(())
            }
            Err(denial) => {
                warn!(
                    scope = %scope,
                    window = denial.window.as_label(),
                    used = denial.used,
                    limit = denial.limit,
                    reset_at = %denial.reset_at,
                    "budget exceeded"
                );
                Err(GovernorError::BudgetExceeded {
                    scope: scope.clone(),
                    window: denial.window,
                    used: denial.used,
                    limit: denial.limit,
                    reset_at: denial.reset_at,
                })
            }
        }
    }

    /// Remaining budget for one scope's tool, under that scope's prompt.
    pub fn tool_budget(&self, scope: &Scope) -> ToolBudget {
        self.tool_budget_at(scope, Utc::now())
    }

    /// [`tool_budget`](Self::tool_budget) with an injected clock.
    pub fn tool_budget_at(&self, scope: &Scope, now: DateTime<Utc>) -> ToolBudget {
        let limit = self
            .limits
            .resolve(&scope.tool_name, scope.prompt_id.as_deref());
        let hourly = self
            .ledger
            .remaining_at(scope, WindowKind::Hourly, limit.hourly_limit, now);
        let daily = self
            .ledger
            .remaining_at(scope, WindowKind::Daily, limit.daily_limit, now);
        ToolBudget::new(hourly, daily)
    }

    /// Remaining budget per tool for a project.
    ///
    /// With a tool given, reports just that tool; otherwise it covers the
    /// union of tools the ledger has seen for the project, tools with
    /// configured defaults, and tools named by the prompt's overrides.
    pub fn remaining_budget(
        &self,
        project_id: &str,
        tool_name: Option<&str>,
        prompt_id: Option<&str>,
    ) -> HashMap<String, ToolBudget> {
        self.remaining_budget_at(project_id, tool_name, prompt_id, Utc::now())
    }

    /// [`remaining_budget`](Self::remaining_budget) with an injected clock.
    pub fn remaining_budget_at(
        &self,
        project_id: &str,
        tool_name: Option<&str>,
        prompt_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> HashMap<String, ToolBudget> {
        let tools: Vec<String> = match tool_name {
            Some(tool) => vec![tool.to_string()],
            None => {
                let mut tools = self.ledger.tools_seen(project_id);
                tools.extend(self.limits.default_tools().map(str::to_string));
                if let Some(prompt) = prompt_id {
                    tools.extend(self.limits.prompt_tools(prompt).map(str::to_string));
                }
                tools.sort();
                tools.dedup();
                tools
            }
        };

        tools
            .into_iter()
            .map(|tool| {
                let scope = Scope {
                    project_id: project_id.to_string(),
                    tool_name: tool.clone(),
                    prompt_id: prompt_id.map(str::to_string),
                };
                (tool, self.tool_budget_at(&scope, now))
            })
            .collect()
    }

    /// Full serializable report for a project.
    pub fn budget_report(
        &self,
        project_id: &str,
        tool_name: Option<&str>,
        prompt_id: Option<&str>,
    ) -> BudgetReport {
        BudgetReport {
            project_id: project_id.to_string(),
            generated_at: Utc::now(),
            tools: self.remaining_budget(project_id, tool_name, prompt_id),
        }
    }

    /// Sweep buckets whose window ended before `now - retention`.
    pub fn cleanup_old_usage_data(&self, retention: Duration) -> usize {
        self.ledger.cleanup_old_usage_data(retention)
    }

    /// [`cleanup_old_usage_data`](Self::cleanup_old_usage_data) with an
    /// injected clock.
    pub fn cleanup_old_usage_data_at(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        self.ledger.cleanup_old_usage_data_at(retention, now)
    }
}
