//! Typed governor configuration and TOML loading.
//!
//! Every field is enumerated and unknown keys are rejected at load time;
//! a bad table surfaces [`GovernorError::Configuration`] during setup and
//! never mid-call.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use ::config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetLimit, LimitOverride};
use crate::error::{GovernorError, GovernorResult};
use crate::ratelimit::{ProviderRateConfig, RetryConfig};

/// Complete configuration for a [`Governor`](crate::Governor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernorConfig {
    /// Default limits per tool name.
    #[serde(default)]
    pub default_limits: HashMap<String, BudgetLimit>,
    /// Per-prompt limit overrides: prompt ID → tool name → override.
    #[serde(default)]
    pub prompt_overrides: HashMap<String, HashMap<String, LimitOverride>>,
    /// Request-rate ceilings per provider name; unlisted providers use
    /// the built-in table.
    #[serde(default)]
    pub provider_rate_limits: HashMap<String, ProviderRateConfig>,
    /// Backoff policy for retrying provider rejections.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Serialized form of the retry policy (delays in seconds).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
    /// Cap on any computed delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_secs() -> f64 {
    1.0
}

fn default_max_delay_secs() -> f64 {
    60.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetrySettings {
    /// Convert into the runtime retry policy.
    pub fn to_retry_config(self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.max_retries)
            .with_base_delay(Duration::from_secs_f64(self.base_delay_secs))
            .with_max_delay(Duration::from_secs_f64(self.max_delay_secs))
    }
}

impl GovernorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> GovernorResult<Self> {
        let raw = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .map_err(|err| GovernorError::Configuration(err.to_string()))?;
        let parsed: Self = raw
            .try_deserialize()
            .map_err(|err| GovernorError::Configuration(err.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> GovernorResult<Self> {
        let path = path.as_ref();
        let raw = Config::builder()
            .add_source(File::from(path))
            .build()
            .map_err(|err| GovernorError::Configuration(err.to_string()))?;
        let parsed: Self = raw
            .try_deserialize()
            .map_err(|err| GovernorError::Configuration(err.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check invariants the type system cannot express.
    ///
    /// Zero request rates are rejected here: a ceiling of zero could never
    /// admit a call and has no reset semantics. Blocking a tool belongs to
    /// budget limits, where a zero limit is legal.
    pub fn validate(&self) -> GovernorResult<()> {
        for (provider, rate) in &self.provider_rate_limits {
            if rate.requests_per_minute == 0 || rate.requests_per_hour == 0 {
                return Err(GovernorError::Configuration(format!(
                    "provider '{provider}' has a zero request rate \
                     ({}/min, {}/hour); rates must be at least 1",
                    rate.requests_per_minute, rate.requests_per_hour
                )));
            }
        }

        if self.retry.base_delay_secs <= 0.0 || !self.retry.base_delay_secs.is_finite() {
            return Err(GovernorError::Configuration(format!(
                "retry base_delay_secs must be positive, got {}",
                self.retry.base_delay_secs
            )));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs
            || !self.retry.max_delay_secs.is_finite()
        {
            return Err(GovernorError::Configuration(format!(
                "retry max_delay_secs ({}) must be at least base_delay_secs ({})",
                self.retry.max_delay_secs, self.retry.base_delay_secs
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [default_limits.web_search]
        hourly_limit = 50
        daily_limit = 500

        [prompt_overrides.research.web_search]
        hourly_limit = 20

        [provider_rate_limits.ollama]
        requests_per_minute = 30
        requests_per_hour = 600

        [retry]
        max_retries = 3
        base_delay_secs = 0.5
        max_delay_secs = 30.0
    "#;

    #[test]
    fn test_sample_config_parses() {
        let config = GovernorConfig::from_toml_str(SAMPLE).expect("valid config");
        assert_eq!(
            config.default_limits["web_search"],
            BudgetLimit::new(50, 500)
        );
        assert_eq!(
            config.prompt_overrides["research"]["web_search"],
            LimitOverride::hourly(20)
        );
        assert_eq!(
            config.provider_rate_limits["ollama"],
            ProviderRateConfig::new(30, 600)
        );
        assert_eq!(config.retry.max_retries, 3);

        let retry = config.retry.to_retry_config();
        assert_eq!(retry.base_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GovernorConfig::from_toml_str("").expect("empty is valid");
        assert!(config.default_limits.is_empty());
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_secs, 1.0);
    }

    #[test]
    fn test_partial_tool_limit_fills_from_global_defaults() {
        let config = GovernorConfig::from_toml_str(
            "[default_limits.scrape]\nhourly_limit = 5\n",
        )
        .expect("partial limit is valid");
        let limit = config.default_limits["scrape"];
        assert_eq!(limit.hourly_limit, 5);
        assert_eq!(limit.daily_limit, crate::budget::GLOBAL_DEFAULT_DAILY_LIMIT);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = GovernorConfig::from_toml_str("unknown_section = 1\n")
            .expect_err("unknown key must fail");
        assert!(matches!(err, GovernorError::Configuration(_)));

        let err = GovernorConfig::from_toml_str(
            "[default_limits.t]\nhourly_limit = 5\nweekly_limit = 9\n",
        )
        .expect_err("unknown limit field must fail");
        assert!(matches!(err, GovernorError::Configuration(_)));
    }

    #[test]
    fn test_zero_request_rate_is_rejected() {
        let err = GovernorConfig::from_toml_str(
            "[provider_rate_limits.p]\nrequests_per_minute = 0\nrequests_per_hour = 100\n",
        )
        .expect_err("zero rate must fail");
        assert!(err.to_string().contains("zero request rate"));
    }

    #[test]
    fn test_bad_retry_delays_are_rejected() {
        let err = GovernorConfig::from_toml_str(
            "[retry]\nbase_delay_secs = 0.0\n",
        )
        .expect_err("zero base delay must fail");
        assert!(matches!(err, GovernorError::Configuration(_)));

        let err = GovernorConfig::from_toml_str(
            "[retry]\nbase_delay_secs = 10.0\nmax_delay_secs = 5.0\n",
        )
        .expect_err("max below base must fail");
        assert!(err.to_string().contains("at least base_delay_secs"));
    }

    #[test]
    fn test_loading_from_a_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write config");

        let config = GovernorConfig::from_toml_file(file.path()).expect("loads from disk");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let err = GovernorConfig::from_toml_file("/nonexistent/governor.toml")
            .expect_err("missing file must fail");
        assert!(matches!(err, GovernorError::Configuration(_)));
    }
}
