//! Failure classification: retry or propagate.
//!
//! Providers signal rate-limit rejections inconsistently: a 429 status, a
//! message substring, or an explicit retry-after hint. The classifier
//! normalizes those signals into [`FailureKind`] so the retry controller
//! can act on them. Authentication and malformed-request failures are
//! always fatal and bypass retry entirely.

use std::time::Duration;

use crate::error::ProviderError;

/// Outcome of classifying a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Worth retrying; carries the wait hint when one is known.
    Retryable {
        /// Explicit or provider-default wait; takes precedence over
        /// computed backoff when present.
        retry_after: Option<Duration>,
    },
    /// Must not be retried.
    Fatal,
}

/// Classifies provider failures by status code and message markers.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    retryable_statuses: Vec<u16>,
    retryable_markers: Vec<String>,
    fatal_markers: Vec<String>,
    default_retry_after: Option<Duration>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureClassifier {
    /// Base classifier: recognizes 429 statuses and common rate-limit
    /// phrasing, with no provider wait hint.
    pub fn new() -> Self {
        Self {
            retryable_statuses: vec![429],
            retryable_markers: vec![
                "rate limit".to_string(),
                "too many requests".to_string(),
                "throttl".to_string(),
            ],
            fatal_markers: vec![
                "unauthorized".to_string(),
                "forbidden".to_string(),
                "invalid api key".to_string(),
                "authentication".to_string(),
                "malformed".to_string(),
            ],
            default_retry_after: None,
        }
    }

    /// Preset for Groq: 429s dominate and the service expects long waits.
    pub fn groq() -> Self {
        Self::new()
            .with_retryable_marker("429")
            .with_default_retry_after(Duration::from_secs(60))
    }

    /// Preset for a local Ollama instance: rejections clear quickly.
    pub fn ollama() -> Self {
        Self::new().with_default_retry_after(Duration::from_secs(5))
    }

    /// Preset for providers without specific knowledge.
    pub fn generic() -> Self {
        Self::new()
            .with_retryable_marker("429")
            .with_default_retry_after(Duration::from_secs(10))
    }

    /// Pick the preset for a provider name.
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            "groq" => Self::groq(),
            "ollama" => Self::ollama(),
            _ => Self::generic(),
        }
    }

    /// Add a retryable status code.
    pub fn with_retryable_status(mut self, status: u16) -> Self {
        self.retryable_statuses.push(status);
        self
    }

    /// Add a lowercase substring that marks a failure retryable.
    pub fn with_retryable_marker(mut self, marker: impl Into<String>) -> Self {
        self.retryable_markers.push(marker.into().to_lowercase());
        self
    }

    /// Add a lowercase substring that marks a failure fatal.
    pub fn with_fatal_marker(mut self, marker: impl Into<String>) -> Self {
        self.fatal_markers.push(marker.into().to_lowercase());
        self
    }

    /// Set the wait hint used when a retryable failure carries none.
    pub fn with_default_retry_after(mut self, retry_after: Duration) -> Self {
        self.default_retry_after = Some(retry_after);
        self
    }

    /// Classify a provider failure.
    ///
    /// Fatal markers win over everything; an explicit `retry_after` on
    /// the error marks it retryable and is passed through verbatim;
    /// otherwise status codes and message markers decide, with the
    /// provider's default hint attached. Unrecognized failures are fatal.
    pub fn classify(&self, err: &ProviderError) -> FailureKind {
        if err.fatal {
            return FailureKind::Fatal;
        }
        let message = err.message.to_lowercase();
        if self.fatal_markers.iter().any(|m| message.contains(m)) {
            return FailureKind::Fatal;
        }

        if let Some(retry_after) = err.retry_after {
            return FailureKind::Retryable {
                retry_after: Some(retry_after),
            };
        }

        let status_match = err
            .status
            .is_some_and(|s| self.retryable_statuses.contains(&s));
        let marker_match = self.retryable_markers.iter().any(|m| message.contains(m));

        if status_match || marker_match {
            FailureKind::Retryable {
                retry_after: self.default_retry_after,
            }
        } else {
            FailureKind::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_is_retryable() {
        let classifier = FailureClassifier::new();
        let err = ProviderError::new("upstream said no").with_status(429);
        assert_eq!(
            classifier.classify(&err),
            FailureKind::Retryable { retry_after: None }
        );
    }

    #[test]
    fn test_message_markers_are_retryable() {
        let classifier = FailureClassifier::new();
        for message in ["Rate limit reached", "Too Many Requests", "request throttled"] {
            let err = ProviderError::new(message);
            assert!(
                matches!(classifier.classify(&err), FailureKind::Retryable { .. }),
                "expected retryable for {message:?}"
            );
        }
    }

    #[test]
    fn test_explicit_retry_after_passes_through() {
        let classifier = FailureClassifier::groq();
        let err = ProviderError::new("slow down").with_retry_after(Duration::from_secs(10));
        assert_eq!(
            classifier.classify(&err),
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(10))
            }
        );
    }

    #[test]
    fn test_preset_default_hints() {
        let err = ProviderError::new("rate limit exceeded");
        assert_eq!(
            FailureClassifier::groq().classify(&err),
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(60))
            }
        );
        assert_eq!(
            FailureClassifier::ollama().classify(&err),
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(5))
            }
        );
        assert_eq!(
            FailureClassifier::generic().classify(&err),
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(10))
            }
        );
    }

    #[test]
    fn test_fatal_markers_win_over_retryable_signals() {
        let classifier = FailureClassifier::new();
        // "429" alone does not rescue an authentication failure.
        let err = ProviderError::new("invalid api key (429)").with_status(429);
        assert_eq!(classifier.classify(&err), FailureKind::Fatal);
    }

    #[test]
    fn test_explicitly_fatal_errors_stay_fatal() {
        let classifier = FailureClassifier::generic();
        let err = ProviderError::new("rate limit").into_fatal();
        assert_eq!(classifier.classify(&err), FailureKind::Fatal);
    }

    #[test]
    fn test_unrecognized_failures_are_fatal() {
        let classifier = FailureClassifier::new();
        let err = ProviderError::new("connection reset by peer");
        assert_eq!(classifier.classify(&err), FailureKind::Fatal);
    }

    #[test]
    fn test_custom_marker_makes_transient_errors_retryable() {
        let classifier = FailureClassifier::new().with_retryable_marker("connection reset");
        let err = ProviderError::new("Connection reset by peer");
        assert!(matches!(
            classifier.classify(&err),
            FailureKind::Retryable { .. }
        ));
    }

    #[test]
    fn test_for_provider_picks_presets() {
        let err = ProviderError::new("rate limit");
        assert_eq!(
            FailureClassifier::for_provider("Groq").classify(&err),
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(60))
            }
        );
        assert_eq!(
            FailureClassifier::for_provider("unknown").classify(&err),
            FailureKind::Retryable {
                retry_after: Some(Duration::from_secs(10))
            }
        );
    }
}
