//! Provider rate ceilings and retry settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Request-rate ceilings for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderRateConfig {
    /// Requests admitted per sliding 60-second window.
    pub requests_per_minute: u32,
    /// Requests admitted per sliding 3600-second window.
    pub requests_per_hour: u32,
}

impl Default for ProviderRateConfig {
    fn default() -> Self {
        // Conservative ceilings for providers we know nothing about.
        Self {
            requests_per_minute: 10,
            requests_per_hour: 100,
        }
    }
}

impl ProviderRateConfig {
    /// Create ceilings with explicit per-minute and per-hour caps.
    pub fn new(requests_per_minute: u32, requests_per_hour: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_hour,
        }
    }

    /// Built-in ceilings for a local Ollama instance.
    pub fn ollama() -> Self {
        Self::new(60, 1_000)
    }

    /// Built-in ceilings for Groq's free tier.
    pub fn groq() -> Self {
        Self::new(5, 100)
    }

    /// Built-in ceilings for the named provider, falling back to the
    /// conservative default for unknown names.
    pub fn builtin_for(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            "ollama" => Self::ollama(),
            "groq" => Self::groq(),
            _ => Self::default(),
        }
    }
}

/// Backoff policy for retrying classified-retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the initial attempt before giving up.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any computed delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a retry config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_provider_table() {
        assert_eq!(ProviderRateConfig::builtin_for("ollama"), ProviderRateConfig::new(60, 1_000));
        assert_eq!(ProviderRateConfig::builtin_for("Groq"), ProviderRateConfig::new(5, 100));
        assert_eq!(
            ProviderRateConfig::builtin_for("somebody-new"),
            ProviderRateConfig::new(10, 100)
        );
    }

    #[test]
    fn test_retry_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_retry_builder() {
        let config = RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }
}
