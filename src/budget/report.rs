//! Serializable budget introspection payloads.
//!
//! These are the shapes a tools layer exposes to callers (or to a model)
//! that wants to check its remaining budget before spending it. Hourly
//! resets render as a clock time, daily resets as a calendar date.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::budget::ledger::WindowUsage;
use crate::scope::WindowKind;

/// Fraction of the limit under which remaining budget counts as low.
const LOW_BUDGET_WARNING_FRACTION: f64 = 0.1;

/// Request parameters for a budget status lookup.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct BudgetStatusRequest {
    /// Project to report on.
    pub project_id: String,
    /// Restrict the report to one tool; omit for every known tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Apply this prompt's limit overrides when computing remaining budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

/// Coarse health of a tool's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetHealth {
    /// Plenty of budget left.
    Ok,
    /// A window is below 10% remaining.
    Warning,
    /// A window has no budget left.
    Exceeded,
}

/// One window's usage as rendered in a report.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    /// Calls counted in the current window.
    pub used: u32,
    /// Calls left before the limit.
    pub remaining: u32,
    /// The effective limit.
    pub limit: u32,
    /// When the window rolls over.
    pub reset_at: DateTime<Utc>,
    /// Human-readable rollover: clock time for hourly, date for daily.
    pub resets: String,
}

impl WindowReport {
    /// Render a ledger snapshot for one window kind.
    pub fn from_usage(usage: WindowUsage, kind: WindowKind) -> Self {
        let resets = match kind {
            WindowKind::Hourly => usage.reset_at.format("%H:%M:%S").to_string(),
            WindowKind::Daily => usage.reset_at.format("%Y-%m-%d").to_string(),
        };
        Self {
            used: usage.used,
            remaining: usage.remaining,
            limit: usage.limit,
            reset_at: usage.reset_at,
            resets,
        }
    }
}

/// Remaining budget for one tool across both windows.
#[derive(Debug, Clone, Serialize)]
pub struct ToolBudget {
    /// Hourly window usage.
    pub hourly: WindowReport,
    /// Daily window usage.
    pub daily: WindowReport,
    /// Coarse health across both windows.
    pub status: BudgetHealth,
}

impl ToolBudget {
    /// Build a tool budget from both windows' snapshots.
    pub fn new(hourly: WindowUsage, daily: WindowUsage) -> Self {
        let status = health_of(&[hourly, daily]);
        Self {
            hourly: WindowReport::from_usage(hourly, WindowKind::Hourly),
            daily: WindowReport::from_usage(daily, WindowKind::Daily),
            status,
        }
    }
}

/// Full budget report for a project.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    /// Project the report covers.
    pub project_id: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Per-tool budgets.
    pub tools: HashMap<String, ToolBudget>,
}

impl BudgetReport {
    /// Render as a JSON value for transport through a tools layer.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn health_of(windows: &[WindowUsage]) -> BudgetHealth {
    if windows.iter().any(|w| w.remaining == 0) {
        return BudgetHealth::Exceeded;
    }
    let low = windows.iter().any(|w| {
        (w.remaining as f64) < (w.limit as f64) * LOW_BUDGET_WARNING_FRACTION
    });
    if low {
        BudgetHealth::Warning
    } else {
        BudgetHealth::Ok
    }
}
