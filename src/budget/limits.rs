//! Budget limits and the precedence table that resolves them.
//!
//! Limits resolve field-by-field: a prompt-level override wins over the
//! tool-level default, which wins over the process-wide fallback. The
//! resolution is a pure function of the table and the scope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::scope::WindowKind;

/// Process-wide fallback hourly limit for tools with no configured default.
pub const GLOBAL_DEFAULT_HOURLY_LIMIT: u32 = 100;
/// Process-wide fallback daily limit for tools with no configured default.
pub const GLOBAL_DEFAULT_DAILY_LIMIT: u32 = 1_000;

fn default_hourly() -> u32 {
    GLOBAL_DEFAULT_HOURLY_LIMIT
}

fn default_daily() -> u32 {
    GLOBAL_DEFAULT_DAILY_LIMIT
}

/// Effective per-window call limits for one tool. A limit of 0 blocks
/// every call in that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetLimit {
    /// Calls allowed per hourly window.
    #[serde(default = "default_hourly")]
    pub hourly_limit: u32,
    /// Calls allowed per daily window.
    #[serde(default = "default_daily")]
    pub daily_limit: u32,
}

impl Default for BudgetLimit {
    fn default() -> Self {
        Self {
            hourly_limit: GLOBAL_DEFAULT_HOURLY_LIMIT,
            daily_limit: GLOBAL_DEFAULT_DAILY_LIMIT,
        }
    }
}

impl BudgetLimit {
    /// Create a limit with explicit hourly and daily caps.
    pub fn new(hourly_limit: u32, daily_limit: u32) -> Self {
        Self {
            hourly_limit,
            daily_limit,
        }
    }

    /// A limit that rejects every call.
    pub fn blocked() -> Self {
        Self::new(0, 0)
    }

    /// The cap for one window kind.
    pub fn limit_for(&self, kind: WindowKind) -> u32 {
        match kind {
            WindowKind::Hourly => self.hourly_limit,
            WindowKind::Daily => self.daily_limit,
        }
    }
}

/// Partial limit attached to a prompt. Unset fields inherit from the
/// tool default (and through it, the global fallback).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitOverride {
    /// Hourly cap override, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_limit: Option<u32>,
    /// Daily cap override, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u32>,
}

impl LimitOverride {
    /// Override only the hourly cap.
    pub fn hourly(limit: u32) -> Self {
        Self {
            hourly_limit: Some(limit),
            daily_limit: None,
        }
    }

    /// Override only the daily cap.
    pub fn daily(limit: u32) -> Self {
        Self {
            hourly_limit: None,
            daily_limit: Some(limit),
        }
    }

    /// Override both caps.
    pub fn both(hourly_limit: u32, daily_limit: u32) -> Self {
        Self {
            hourly_limit: Some(hourly_limit),
            daily_limit: Some(daily_limit),
        }
    }
}

impl From<BudgetLimit> for LimitOverride {
    fn from(limit: BudgetLimit) -> Self {
        Self::both(limit.hourly_limit, limit.daily_limit)
    }
}

/// Immutable table of tool defaults and prompt-level overrides.
///
/// Populated once during governor construction; afterwards it is only
/// read, so it needs no locking.
#[derive(Debug, Clone, Default)]
pub struct LimitTable {
    defaults: HashMap<String, BudgetLimit>,
    overrides: HashMap<String, HashMap<String, LimitOverride>>,
}

impl LimitTable {
    /// Create an empty table; every lookup resolves to the global fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default limit for a tool.
    pub fn set_tool_default(&mut self, tool: impl Into<String>, limit: BudgetLimit) {
        self.defaults.insert(tool.into(), limit);
    }

    /// Register a prompt-level override for a tool.
    pub fn set_prompt_override(
        &mut self,
        prompt: impl Into<String>,
        tool: impl Into<String>,
        limit: LimitOverride,
    ) {
        self.overrides
            .entry(prompt.into())
            .or_default()
            .insert(tool.into(), limit);
    }

    /// Resolve the effective limit for a tool, optionally under a prompt.
    ///
    /// Each field resolves independently: prompt override, then tool
    /// default, then the global fallback.
    pub fn resolve(&self, tool: &str, prompt: Option<&str>) -> BudgetLimit {
        let default = self.defaults.get(tool).copied().unwrap_or_default();

        let ov = prompt
            .and_then(|p| self.overrides.get(p))
            .and_then(|tools| tools.get(tool));

        match ov {
            Some(ov) => BudgetLimit {
                hourly_limit: ov.hourly_limit.unwrap_or(default.hourly_limit),
                daily_limit: ov.daily_limit.unwrap_or(default.daily_limit),
            },
            None => default,
        }
    }

    /// Tools that have a configured default.
    pub fn default_tools(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Tools named by a prompt's overrides.
    pub fn prompt_tools(&self, prompt: &str) -> impl Iterator<Item = &str> {
        self.overrides
            .get(prompt)
            .into_iter()
            .flat_map(|tools| tools.keys().map(String::as_str))
    }

    /// Number of configured tool defaults.
    pub fn default_count(&self) -> usize {
        self.defaults.len()
    }

    /// Number of prompts with overrides.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_resolves_to_global_fallback() {
        let table = LimitTable::new();
        let limit = table.resolve("anything", None);
        assert_eq!(limit.hourly_limit, GLOBAL_DEFAULT_HOURLY_LIMIT);
        assert_eq!(limit.daily_limit, GLOBAL_DEFAULT_DAILY_LIMIT);
    }

    #[test]
    fn test_tool_default_wins_over_fallback() {
        let mut table = LimitTable::new();
        table.set_tool_default("search", BudgetLimit::new(50, 500));
        assert_eq!(table.resolve("search", None), BudgetLimit::new(50, 500));
    }

    #[test]
    fn test_prompt_override_wins_over_tool_default() {
        let mut table = LimitTable::new();
        table.set_tool_default("search", BudgetLimit::new(50, 500));
        table.set_prompt_override("research", "search", BudgetLimit::new(20, 200).into());

        assert_eq!(
            table.resolve("search", Some("research")),
            BudgetLimit::new(20, 200)
        );
        // Without the prompt, the default still applies.
        assert_eq!(table.resolve("search", None), BudgetLimit::new(50, 500));
    }

    #[test]
    fn test_partial_override_inherits_missing_field() {
        let mut table = LimitTable::new();
        table.set_tool_default("search", BudgetLimit::new(50, 500));
        table.set_prompt_override("research", "search", LimitOverride::hourly(20));

        let limit = table.resolve("search", Some("research"));
        assert_eq!(limit.hourly_limit, 20);
        assert_eq!(limit.daily_limit, 500);
    }

    #[test]
    fn test_override_for_other_prompt_does_not_apply() {
        let mut table = LimitTable::new();
        table.set_tool_default("search", BudgetLimit::new(50, 500));
        table.set_prompt_override("research", "search", LimitOverride::hourly(20));

        assert_eq!(
            table.resolve("search", Some("summarize")),
            BudgetLimit::new(50, 500)
        );
    }

    #[test]
    fn test_override_without_tool_default_falls_back_to_global() {
        let mut table = LimitTable::new();
        table.set_prompt_override("research", "scrape", LimitOverride::hourly(5));

        let limit = table.resolve("scrape", Some("research"));
        assert_eq!(limit.hourly_limit, 5);
        assert_eq!(limit.daily_limit, GLOBAL_DEFAULT_DAILY_LIMIT);
    }

    #[test]
    fn test_blocked_limit() {
        let limit = BudgetLimit::blocked();
        assert_eq!(limit.limit_for(WindowKind::Hourly), 0);
        assert_eq!(limit.limit_for(WindowKind::Daily), 0);
    }

    #[test]
    fn test_tool_enumeration() {
        let mut table = LimitTable::new();
        table.set_tool_default("search", BudgetLimit::default());
        table.set_prompt_override("research", "scrape", LimitOverride::hourly(5));

        let defaults: Vec<&str> = table.default_tools().collect();
        assert_eq!(defaults, vec!["search"]);
        let prompted: Vec<&str> = table.prompt_tools("research").collect();
        assert_eq!(prompted, vec!["scrape"]);
        assert_eq!(table.prompt_tools("other").count(), 0);
    }
}
