//! Accounting scope and calendar window types.
//!
//! A [`Scope`] identifies who is spending budget: a project, a tool, and
//! optionally the prompt that triggered the call. A [`WindowKind`] is one of
//! the calendar-aligned accounting periods that quotas reset on.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The unit of budget accounting: which project is calling which tool,
/// optionally on behalf of which prompt.
///
/// Usage counters are shared per `(project_id, tool_name)`; `prompt_id`
/// only selects which limits apply, so a prompt-scoped call and an
/// unscoped call to the same tool draw from the same buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Project the call is accounted against.
    pub project_id: String,
    /// Tool being invoked.
    pub tool_name: String,
    /// Prompt whose limit overrides apply, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

impl Scope {
    /// Create a scope with no prompt attached.
    pub fn new(project_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            tool_name: tool_name.into(),
            prompt_id: None,
        }
    }

    /// Attach a prompt ID so prompt-level limit overrides apply.
    pub fn with_prompt(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = Some(prompt_id.into());
        self
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.tool_name)?;
        if let Some(prompt_id) = &self.prompt_id {
            write!(f, " (prompt {})", prompt_id)?;
        }
        Ok(())
    }
}

/// Calendar-aligned accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Resets at the top of every UTC hour.
    Hourly,
    /// Resets at UTC midnight.
    Daily,
}

impl WindowKind {
    /// Window length in seconds.
    pub const fn seconds(&self) -> i64 {
        match self {
            WindowKind::Hourly => 3_600,
            WindowKind::Daily => 86_400,
        }
    }

    /// Window length as a chrono duration.
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Calendar-aligned index of the window containing `now`
    /// (epoch-hour or epoch-day number).
    pub fn window_index(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.seconds())
    }

    /// UTC start of the window with the given index.
    pub fn window_start(&self, index: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(index.saturating_mul(self.seconds()), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// UTC end of the window with the given index (start of the next one).
    pub fn window_end(&self, index: i64) -> DateTime<Utc> {
        self.window_start(index.saturating_add(1))
    }

    /// When the window containing `now` rolls over.
    pub fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.window_end(self.window_index(now))
    }

    /// Lowercase label used in logs and error messages.
    pub fn as_label(&self) -> &'static str {
        match self {
            WindowKind::Hourly => "hourly",
            WindowKind::Daily => "daily",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_scope_display_without_prompt() {
        let scope = Scope::new("proj", "web_search");
        assert_eq!(scope.to_string(), "proj/web_search");
    }

    #[test]
    fn test_scope_display_with_prompt() {
        let scope = Scope::new("proj", "web_search").with_prompt("research");
        assert_eq!(scope.to_string(), "proj/web_search (prompt research)");
    }

    #[test]
    fn test_hourly_window_index_truncates_to_hour() {
        // 10:59:59 and 10:00:00 share an index; 11:00:00 starts a new one.
        let base = at(3_600 * 100);
        assert_eq!(
            WindowKind::Hourly.window_index(base),
            WindowKind::Hourly.window_index(base + Duration::seconds(3_599))
        );
        assert_eq!(
            WindowKind::Hourly.window_index(base + Duration::seconds(3_600)),
            WindowKind::Hourly.window_index(base) + 1
        );
    }

    #[test]
    fn test_daily_window_index_truncates_to_day() {
        let base = at(86_400 * 10);
        assert_eq!(
            WindowKind::Daily.window_index(base),
            WindowKind::Daily.window_index(base + Duration::hours(23))
        );
        assert_eq!(
            WindowKind::Daily.window_index(base + Duration::days(1)),
            WindowKind::Daily.window_index(base) + 1
        );
    }

    #[test]
    fn test_next_reset_is_start_of_next_window() {
        let now = at(3_600 * 100 + 1_234);
        assert_eq!(WindowKind::Hourly.next_reset(now), at(3_600 * 101));

        let now = at(86_400 * 10 + 5_000);
        assert_eq!(WindowKind::Daily.next_reset(now), at(86_400 * 11));
    }

    #[test]
    fn test_window_start_end_roundtrip() {
        let kind = WindowKind::Hourly;
        let now = at(7_200 + 42);
        let index = kind.window_index(now);
        assert!(kind.window_start(index) <= now);
        assert!(kind.window_end(index) > now);
        assert_eq!(kind.window_end(index) - kind.window_start(index), kind.duration());
    }

    #[test]
    fn test_labels() {
        assert_eq!(WindowKind::Hourly.as_label(), "hourly");
        assert_eq!(WindowKind::Daily.to_string(), "daily");
    }
}
