//! Resource governance for frameworks that dispatch LLM and tool calls.
//!
//! Tollgate mediates calls to rate-limited providers and budgeted tools:
//! per-scope usage quotas over rolling calendar windows, request-rate
//! throttling against provider ceilings, and transparent retry of
//! transient rejections with bounded exponential backoff.
//!
//! # Overview
//!
//! - [`budget`]: quota enforcement (ledger, limit resolution, reports)
//! - [`ratelimit`]: throttle gate, failure classification, backoff retry
//! - [`Governor`]: the single entry point composing both layers
//!
//! # Example
//!
//! ```ignore
//! use tollgate::{BudgetLimit, Governor, ProviderError, ProviderRateConfig, Scope};
//!
//! let governor = Governor::builder()
//!     .with_tool_limits("web_search", BudgetLimit::new(50, 500))
//!     .with_provider("ollama", ProviderRateConfig::ollama())
//!     .build();
//!
//! let scope = Scope::new("my-project", "web_search");
//! let result = governor
//!     .invoke(&scope, "ollama", || async {
//!         // Call the provider; map its failure into a ProviderError.
//!         Ok::<_, ProviderError>("response")
//!     })
//!     .await;
//!
//! match result {
//!     Ok(response) => println!("{response}"),
//!     Err(err) => eprintln!("call not admitted: {err}"),
//! }
//! ```

pub mod budget;
pub mod config;
pub mod error;
pub mod governor;
pub mod ratelimit;
pub mod scope;

pub use budget::{
    BudgetHealth, BudgetLimit, BudgetReport, BudgetStatusRequest, LimitOverride, ToolBudget,
};
pub use config::GovernorConfig;
pub use error::{GovernorError, GovernorResult, ProviderError};
pub use governor::{Governor, GovernorBuilder};
pub use ratelimit::{FailureClassifier, ProviderRateConfig, RetryConfig};
pub use scope::{Scope, WindowKind};
