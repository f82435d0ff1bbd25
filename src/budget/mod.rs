//! Usage-quota enforcement over rolling calendar windows.
//!
//! This module tracks how often each `(project, tool)` pair is called and
//! rejects calls once the effective hourly or daily limit is reached.
//! Limits resolve by precedence: prompt-level override, then tool-level
//! default, then a process-wide fallback.
//!
//! # Overview
//!
//! - **BudgetLimit / LimitTable**: effective limits and their resolution
//! - **UsageLedger**: atomic check-and-increment over window buckets
//! - **BudgetManager**: two-window, all-or-nothing admission
//! - **BudgetReport**: serializable introspection for a tools layer
//!
//! # Example
//!
//! ```ignore
//! use tollgate::budget::{BudgetManager, BudgetLimit, LimitTable};
//! use tollgate::Scope;
//! use std::sync::Arc;
//!
//! let mut table = LimitTable::new();
//! table.set_tool_default("web_search", BudgetLimit::new(50, 500));
//!
//! let manager = BudgetManager::new(Arc::new(table));
//! let scope = Scope::new("my-project", "web_search");
//!
//! if manager.check_and_update_budget(&scope).is_ok() {
//!     // Budget charged; run the tool call.
//! }
//! ```

mod ledger;
mod limits;
mod manager;
mod report;

pub use ledger::{LedgerDenial, UsageLedger, WindowUsage};
pub use limits::{
    BudgetLimit, LimitOverride, LimitTable, GLOBAL_DEFAULT_DAILY_LIMIT,
    GLOBAL_DEFAULT_HOURLY_LIMIT,
};
pub use manager::{default_usage_retention, BudgetManager};
pub use report::{BudgetHealth, BudgetReport, BudgetStatusRequest, ToolBudget, WindowReport};
