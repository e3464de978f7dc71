//! The backend trait: one classified attempt against a provider.
//!
//! The retry loop and the scheduler only ever see this trait, so tests swap
//! the HTTP transport for a scripted backend.

use async_trait::async_trait;

use promptgate_core::error::ProviderError;

use crate::registry::ProviderSpec;

/// Everything a single attempt needs to know, borrowed from settings.
#[derive(Clone, Debug)]
pub struct RequestContext<'a> {
    /// The provider being called.
    pub provider: &'static ProviderSpec,
    /// Model id to request.
    pub model: &'a str,
    /// Raw API key.
    pub api_key: &'a str,
    /// Organization id, sent only on the OpenAI-shaped wire.
    pub organization: Option<&'a str>,
    /// API base URL (settings override or the provider default).
    pub api_base: &'a str,
}

/// One attempt against a provider: no retries, no backoff, just a classified
/// outcome.
///
/// On success returns the resolved assistant text (an unexpected body shape
/// is normalized to a placeholder string, never an error). Failures are
/// classified into [`ProviderError`] variants; the retry loop decides what
/// happens next.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn attempt(
        &self,
        prompt: &str,
        ctx: &RequestContext<'_>,
    ) -> Result<String, ProviderError>;
}
