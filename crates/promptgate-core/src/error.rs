//! Failure taxonomy for provider calls.
//!
//! Every transport outcome is classified into one of these variants before it
//! reaches the scheduler. The caller-facing `submit` surface never sees this
//! type: the scheduler formats each variant into a display string.

use std::time::Duration;

/// Classified failure from a provider call or a configuration setter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The key failed the provider's format heuristic. No request was sent.
    #[error("invalid API key format: {0}")]
    MalformedKey(String),

    /// The provider rejected the key (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// The provider rate-limited the call (HTTP 429 or text heuristic match).
    #[error("rate limit exceeded")]
    RateLimited {
        /// Provider-supplied `retry-after`, when present.
        retry_after: Option<Duration>,
    },

    /// Network or parse failure, or a non-success status outside 401/403/429.
    #[error("request failed: {0}")]
    Transport(String),

    /// No provider with this id in the catalog.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Model id not in the provider's catalog.
    #[error("unknown model '{model}' for provider '{provider}'")]
    UnknownModel { provider: String, model: String },
}

impl ProviderError {
    /// Whether this failure counts as a rate limit for cooldown purposes.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Transport(msg) => looks_rate_limited(msg),
            _ => false,
        }
    }
}

/// Substring heuristic for spotting rate limiting in arbitrary error text.
///
/// Matches "rate limit" (case-insensitive) or "429". Fragile by nature and
/// deliberately kept as-is; transports that can classify by status code do so
/// before falling back to this.
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("429")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_matches_rate_limit_text() {
        assert!(looks_rate_limited("Rate limit exceeded, slow down"));
        assert!(looks_rate_limited("HTTP 429 Too Many Requests"));
        assert!(looks_rate_limited("RATE LIMIT"));
    }

    #[test]
    fn test_heuristic_ignores_other_text() {
        assert!(!looks_rate_limited("connection refused"));
        assert!(!looks_rate_limited("HTTP 500 Internal Server Error"));
    }

    #[test]
    fn test_rate_limited_variant() {
        let err = ProviderError::RateLimited { retry_after: None };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_transport_variant_uses_heuristic() {
        assert!(ProviderError::Transport("got 429 from upstream".into()).is_rate_limited());
        assert!(!ProviderError::Transport("dns failure".into()).is_rate_limited());
    }

    #[test]
    fn test_unauthorized_is_not_rate_limited() {
        let err = ProviderError::Unauthorized("bad key".into());
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_display_messages() {
        let err = ProviderError::UnknownModel {
            provider: "openai".into(),
            model: "gpt-99".into(),
        };
        assert_eq!(
            err.to_string(),
            "unknown model 'gpt-99' for provider 'openai'"
        );
    }
}
