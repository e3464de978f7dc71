//! HTTP transport: executes one provider call and classifies the outcome.
//!
//! Covers both wire contracts: OpenAI-shaped `/chat/completions` with Bearer
//! auth (plus the optional `OpenAI-Organization` header) and Anthropic-shaped
//! `/messages` with `x-api-key` / `anthropic-version` headers.
//!
//! No retry logic lives here: see [`crate::retry`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use promptgate_core::error::{looks_rate_limited, ProviderError};
use promptgate_core::types::{
    AnthropicMessageRequest, AnthropicMessageResponse, ChatCompletionRequest,
    ChatCompletionResponse, WireErrorBody, WireMessage,
};

use crate::registry::{key_matches_provider, WireFormat};
use crate::traits::{ChatBackend, RequestContext};

/// Version header required by the Anthropic-shaped wire.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Fixed generation budget on the Anthropic-shaped wire (the OpenAI shape
/// takes no explicit budget).
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// Real HTTP backend over a shared, connection-pooled client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");
        HttpTransport { client }
    }

    /// Build the full endpoint URL for the provider's wire shape.
    fn endpoint(ctx: &RequestContext<'_>) -> String {
        let base = ctx.api_base.trim_end_matches('/');
        match ctx.provider.wire {
            WireFormat::ChatCompletions => format!("{}/chat/completions", base),
            WireFormat::Messages => format!("{}/messages", base),
        }
    }

    fn build_request(&self, prompt: &str, ctx: &RequestContext<'_>) -> reqwest::RequestBuilder {
        let url = Self::endpoint(ctx);
        match ctx.provider.wire {
            WireFormat::ChatCompletions => {
                let body = ChatCompletionRequest {
                    model: ctx.model.to_string(),
                    messages: vec![WireMessage::user(prompt)],
                };
                let mut request = self.client.post(&url).bearer_auth(ctx.api_key).json(&body);
                if let Some(org) = ctx.organization {
                    request = request.header("OpenAI-Organization", org);
                }
                request
            }
            WireFormat::Messages => {
                let body = AnthropicMessageRequest {
                    model: ctx.model.to_string(),
                    max_tokens: ANTHROPIC_MAX_TOKENS,
                    messages: vec![WireMessage::user(prompt)],
                };
                self.client
                    .post(&url)
                    .header("x-api-key", ctx.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }
}

/// Pull a numeric `retry-after` (seconds) out of a 429 response, if present.
fn retry_after_of(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ChatBackend for HttpTransport {
    async fn attempt(
        &self,
        prompt: &str,
        ctx: &RequestContext<'_>,
    ) -> Result<String, ProviderError> {
        // Fail fast on a malformed key: no network attempt.
        if !key_matches_provider(ctx.provider, ctx.api_key) {
            return Err(ProviderError::MalformedKey(format!(
                "key does not match the {} format",
                ctx.provider.display_name
            )));
        }

        debug!(
            provider = ctx.provider.id,
            model = ctx.model,
            "sending provider request"
        );

        let response = self
            .build_request(prompt, ctx)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                error!(provider = ctx.provider.id, error = %msg, "HTTP request failed");
                if looks_rate_limited(&msg) {
                    ProviderError::RateLimited { retry_after: None }
                } else {
                    ProviderError::Transport(msg)
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = retry_after_of(&response);
            warn!(
                provider = ctx.provider.id,
                retry_after_s = retry_after.map(|d| d.as_secs()),
                "provider rate limited the request"
            );
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            let detail = WireErrorBody::message_from(&body)
                .unwrap_or_else(|| "check that your API key is correct".to_string());
            error!(provider = ctx.provider.id, status = %status, detail = %detail, "authentication failed");
            return Err(ProviderError::Unauthorized(detail));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = WireErrorBody::message_from(&body)
                .unwrap_or_else(|| format!("HTTP {}", status));
            error!(provider = ctx.provider.id, status = %status, body = %body, "API error");
            return Err(ProviderError::Transport(message));
        }

        let text = match ctx.provider.wire {
            WireFormat::ChatCompletions => response
                .json::<ChatCompletionResponse>()
                .await
                .map(ChatCompletionResponse::into_text),
            WireFormat::Messages => response
                .json::<AnthropicMessageResponse>()
                .await
                .map(AnthropicMessageResponse::into_text),
        }
        .map_err(|e| {
            let msg = format!("failed to parse provider response: {}", e);
            error!(provider = ctx.provider.id, error = %msg, "parse failure");
            if looks_rate_limited(&msg) {
                ProviderError::RateLimited { retry_after: None }
            } else {
                ProviderError::Transport(msg)
            }
        })?;

        debug!(provider = ctx.provider.id, chars = text.len(), "provider response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn openai_ctx<'a>(api_base: &'a str, key: &'a str) -> RequestContext<'a> {
        RequestContext {
            provider: find("openai").unwrap(),
            model: "gpt-4o",
            api_key: key,
            organization: None,
            api_base,
        }
    }

    fn anthropic_ctx<'a>(api_base: &'a str, key: &'a str) -> RequestContext<'a> {
        RequestContext {
            provider: find("anthropic").unwrap(),
            model: "claude-3-haiku-20240307",
            api_key: key,
            organization: None,
            api_base,
        }
    }

    #[test]
    fn test_endpoint_per_wire_shape() {
        let ctx = openai_ctx("https://api.openai.com/v1/", "sk-k");
        assert_eq!(
            HttpTransport::endpoint(&ctx),
            "https://api.openai.com/v1/chat/completions"
        );
        let ctx = anthropic_ctx("https://api.anthropic.com/v1", "sk-ant-api03-k");
        assert_eq!(
            HttpTransport::endpoint(&ctx),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[tokio::test]
    async fn test_openai_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test-123"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Hi from the mock"}}]
            })))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "sk-test-123");
        let text = HttpTransport::new().attempt("Hello", &ctx).await.unwrap();
        assert_eq!(text, "Hi from the mock");
    }

    #[tokio::test]
    async fn test_openai_sends_organization_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("OpenAI-Organization", "org-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let mut ctx = openai_ctx(&uri, "sk-test-123");
        ctx.organization = Some("org-42");
        let text = HttpTransport::new().attempt("Hello", &ctx).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_anthropic_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-api03-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-3-haiku-20240307",
                "max_tokens": 1024
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Hello from Claude"}]
            })))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = anthropic_ctx(&uri, "sk-ant-api03-test");
        let text = HttpTransport::new().attempt("Hello", &ctx).await.unwrap();
        assert_eq!(text, "Hello from Claude");
    }

    #[tokio::test]
    async fn test_rate_limit_with_retry_after() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(json!({"error": {"message": "Rate limit exceeded"}})),
            )
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "sk-test-123");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        match err {
            ProviderError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_without_retry_after() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "sk-test-123");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        match err {
            ProviderError::RateLimited { retry_after } => assert!(retry_after.is_none()),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_carries_provider_detail() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "sk-test-123");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        match err {
            ProviderError::Unauthorized(detail) => {
                assert_eq!(detail, "Incorrect API key provided")
            }
            other => panic!("expected Unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "sk-test-123");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        match err {
            ProviderError::Transport(msg) => assert!(msg.contains("500")),
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_key_sends_no_request() {
        let mock_server = MockServer::start().await;

        // The mock would 500 if hit; expect(0) asserts it never is.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "garbage");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedKey(_)));

        // Anthropic-format key on the OpenAI provider is also malformed.
        let ctx = openai_ctx(&uri, "sk-ant-api03-test");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedKey(_)));
    }

    #[tokio::test]
    async fn test_unexpected_success_shape_is_placeholder() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ctx = openai_ctx(&uri, "sk-test-123");
        let text = HttpTransport::new().attempt("Hello", &ctx).await.unwrap();
        assert_eq!(text, "[No response from provider]");
    }

    #[tokio::test]
    async fn test_network_error_is_transport_failure() {
        // Point to a port that's not listening.
        let ctx = openai_ctx("http://127.0.0.1:1", "sk-test-123");
        let err = HttpTransport::new().attempt("Hello", &ctx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
