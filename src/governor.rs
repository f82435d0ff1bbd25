//! The governor: one object that owns all governance state.
//!
//! A [`Governor`] sequences every mediated call the same way: budget check
//! (which charges both windows up front), then the rate-limited, retrying
//! execution of the operation. There is no global instance: construct one
//! and share it by reference (`Arc<Governor>` between tasks).

use std::collections::HashMap;
use std::sync::Arc;
use std::future::Future;

use chrono::Duration as ChronoDuration;
use tokio::time::Instant;
use tracing::info;

use crate::budget::{
    default_usage_retention, BudgetLimit, BudgetManager, BudgetReport, BudgetStatusRequest,
    LimitOverride, LimitTable, ToolBudget,
};
use crate::config::GovernorConfig;
use crate::error::{GovernorResult, ProviderError};
use crate::ratelimit::{FailureClassifier, ProviderRateConfig, RateLimiter, RetryConfig};
use crate::scope::Scope;

/// Mediates calls to rate-limited providers and budgeted tools.
#[derive(Debug)]
pub struct Governor {
    budget: BudgetManager,
    limiter: RateLimiter,
}

impl Governor {
    /// Start building a governor with explicit registration calls.
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::new()
    }

    /// Build a governor from a validated configuration.
    pub fn from_config(config: GovernorConfig) -> GovernorResult<Self> {
        config.validate()?;

        let mut builder = Self::builder().with_retry(config.retry.to_retry_config());
        for (tool, limit) in config.default_limits {
            builder = builder.with_tool_limits(tool, limit);
        }
        for (prompt, tools) in config.prompt_overrides {
            for (tool, limit) in tools {
                builder = builder.with_prompt_override(prompt.clone(), tool, limit);
            }
        }
        for (provider, rate) in config.provider_rate_limits {
            builder = builder.with_provider(provider, rate);
        }
        Ok(builder.build())
    }

    /// Run `op` against `provider` if the scope's budget and the
    /// provider's request ceilings allow it.
    ///
    /// On budget exhaustion the operation never runs. Once admitted, the
    /// budget charge stands regardless of the call's outcome, and rate
    /// limit retries do not re-charge it.
    pub async fn invoke<T, F, Fut>(
        &self,
        scope: &Scope,
        provider: &str,
        op: F,
    ) -> GovernorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.budget.check_and_update_budget(scope)?;
        self.limiter.call(provider, op).await
    }

    /// [`invoke`](Self::invoke) with an overall deadline across throttle
    /// waits and retries.
    pub async fn invoke_with_deadline<T, F, Fut>(
        &self,
        scope: &Scope,
        provider: &str,
        deadline: Instant,
        op: F,
    ) -> GovernorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.budget.check_and_update_budget(scope)?;
        self.limiter.call_with_deadline(provider, deadline, op).await
    }

    /// Remaining budget for one scope's tool, under that scope's prompt.
    pub fn remaining_budget(&self, scope: &Scope) -> ToolBudget {
        self.budget.tool_budget(scope)
    }

    /// Remaining budget per tool for a project. With `tool_name` unset,
    /// covers every tool the ledger or the limit tables know about.
    pub fn remaining_budgets(
        &self,
        project_id: &str,
        tool_name: Option<&str>,
        prompt_id: Option<&str>,
    ) -> HashMap<String, ToolBudget> {
        self.budget.remaining_budget(project_id, tool_name, prompt_id)
    }

    /// Serializable budget report for a tools layer.
    pub fn budget_report(&self, request: &BudgetStatusRequest) -> BudgetReport {
        self.budget.budget_report(
            &request.project_id,
            request.tool_name.as_deref(),
            request.prompt_id.as_deref(),
        )
    }

    /// Sweep usage buckets whose window ended before `now - retention`.
    /// Returns the number of buckets removed.
    pub fn cleanup_old_usage_data(&self, retention: ChronoDuration) -> usize {
        self.budget.cleanup_old_usage_data(retention)
    }

    /// [`cleanup_old_usage_data`](Self::cleanup_old_usage_data) with the
    /// default two-day retention horizon.
    pub fn cleanup_expired_usage(&self) -> usize {
        self.budget.cleanup_old_usage_data(default_usage_retention())
    }

    /// Budget admission without the rate-limiting layer, for callers that
    /// dispatch the operation themselves.
    pub fn check_and_update_budget(&self, scope: &Scope) -> GovernorResult<()> {
        self.budget.check_and_update_budget(scope)
    }
}

/// Explicit registration of limits, providers, and retry policy.
///
/// Everything registered here becomes immutable once [`build`]
/// (GovernorBuilder::build) returns; the governor reads the tables without
/// locks afterwards.
#[derive(Debug, Default)]
pub struct GovernorBuilder {
    limits: LimitTable,
    providers: HashMap<String, ProviderRateConfig>,
    classifiers: HashMap<String, FailureClassifier>,
    retry: RetryConfig,
}

impl GovernorBuilder {
    /// Start with empty tables and default retry policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default limits for a tool.
    pub fn with_tool_limits(mut self, tool: impl Into<String>, limit: BudgetLimit) -> Self {
        self.limits.set_tool_default(tool, limit);
        self
    }

    /// Register a prompt-level override for a tool.
    pub fn with_prompt_override(
        mut self,
        prompt: impl Into<String>,
        tool: impl Into<String>,
        limit: LimitOverride,
    ) -> Self {
        self.limits.set_prompt_override(prompt, tool, limit);
        self
    }

    /// Register request ceilings for a provider.
    pub fn with_provider(mut self, provider: impl Into<String>, rate: ProviderRateConfig) -> Self {
        self.providers.insert(provider.into(), rate);
        self
    }

    /// Register a failure classifier for a provider, replacing the preset.
    pub fn with_classifier(
        mut self,
        provider: impl Into<String>,
        classifier: FailureClassifier,
    ) -> Self {
        self.classifiers.insert(provider.into(), classifier);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Freeze the tables and build the governor.
    pub fn build(self) -> Governor {
        info!(
            tool_defaults = self.limits.default_count(),
            prompt_overrides = self.limits.override_count(),
            providers = self.providers.len(),
            max_retries = self.retry.max_retries,
            "governor initialized"
        );
        Governor {
            budget: BudgetManager::new(Arc::new(self.limits)),
            limiter: RateLimiter::new(self.providers, self.classifiers, self.retry),
        }
    }
}
