//! Shared types: the status snapshot and the wire structs for both provider
//! shapes.
//!
//! Wire structs are typed serde models of the exact request/response bodies,
//! so a format error is a compile error rather than a malformed payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─────────────────────────────────────────────
// API key status
// ─────────────────────────────────────────────

/// What the gateway currently believes about the configured API key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Unknown,
    Valid,
    Invalid,
    RateLimited,
}

impl Default for ApiKeyStatus {
    fn default() -> Self {
        ApiKeyStatus::Unknown
    }
}

// ─────────────────────────────────────────────
// Call statistics
// ─────────────────────────────────────────────

/// Counters for real provider traffic since the last reset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub last_reset: chrono::DateTime<chrono::Utc>,
}

impl Default for CallStats {
    fn default() -> Self {
        CallStats {
            total: 0,
            successful: 0,
            failed: 0,
            rate_limited: 0,
            last_reset: chrono::Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────
// Queue status snapshot
// ─────────────────────────────────────────────

/// Read-only snapshot of the scheduler, for display layers.
#[derive(Clone, Debug)]
pub struct QueueStatus {
    /// Entries waiting in the FIFO (not counting one currently in flight).
    pub queue_length: usize,
    /// Pending submissions, including any in flight.
    pub total_queued: u64,
    /// Whether a tick is executing right now.
    pub currently_processing: bool,
    /// Rough wait estimate: queue length × minimum request interval.
    pub estimated_time_remaining: Duration,
    /// Last classified failure, formatted.
    pub last_error: Option<String>,
    /// Whether the most recent failure was a rate limit that has not cleared.
    pub rate_limit_hit: bool,
    /// Time left in the cooldown window, zero when not cooling down.
    pub cooldown_remaining: Duration,
    pub api_key_status: ApiKeyStatus,
    pub call_stats: CallStats,
    pub batch_mode: bool,
    pub paused: bool,
    pub offline_mode: bool,
    /// Current provider id.
    pub provider: String,
    /// Current model id.
    pub model: String,
}

// ─────────────────────────────────────────────
// OpenAI-shaped wire types (chat completions)
// ─────────────────────────────────────────────

/// A chat message. Both provider shapes accept the same `{role, content}` pair.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    /// A single-turn user message.
    pub fn user(content: impl Into<String>) -> Self {
        WireMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for `POST {base}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
}

/// Response body from an OpenAI-shaped endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Pull out the assistant text, normalizing a missing shape to a
    /// placeholder rather than failing.
    pub fn into_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "[No response from provider]".to_string())
    }
}

// ─────────────────────────────────────────────
// Anthropic-shaped wire types (messages)
// ─────────────────────────────────────────────

/// Request body for `POST {base}/messages`.
#[derive(Debug, Serialize)]
pub struct AnthropicMessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<WireMessage>,
}

/// Response body from an Anthropic-shaped endpoint.
#[derive(Debug, Deserialize)]
pub struct AnthropicMessageResponse {
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl AnthropicMessageResponse {
    /// Pull out the first text block, normalizing anything unexpected to a
    /// placeholder rather than failing.
    pub fn into_text(self) -> String {
        match self.content.into_iter().next() {
            Some(block) if block.block_type == "text" => block
                .text
                .unwrap_or_else(|| "[No response from provider]".to_string()),
            Some(_) => "[Provider replied in an unexpected format]".to_string(),
            None => "[No response from provider]".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Error body (both shapes use {"error": {"message": ...}})
// ─────────────────────────────────────────────

/// Error payload sent by both provider shapes on non-success statuses.
#[derive(Debug, Deserialize)]
pub struct WireErrorBody {
    #[serde(default)]
    pub error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct WireErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl WireErrorBody {
    /// Best-effort extraction of the provider's error message from a raw body.
    pub fn message_from(body: &str) -> Option<String> {
        serde_json::from_str::<WireErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_key_status_serialization() {
        assert_eq!(
            serde_json::to_value(ApiKeyStatus::RateLimited).unwrap(),
            json!("rate_limited")
        );
        assert_eq!(
            serde_json::to_value(ApiKeyStatus::Unknown).unwrap(),
            json!("unknown")
        );
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![WireMessage::user("Hello")],
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_anthropic_request_serialization() {
        let request = AnthropicMessageRequest {
            model: "claude-3-haiku-20240307".to_string(),
            max_tokens: 1024,
            messages: vec![WireMessage::user("Hello")],
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "claude-3-haiku-20240307");
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_chat_response_text_extraction() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "Hi there!"}}]
        }))
        .unwrap();
        assert_eq!(resp.into_text(), "Hi there!");
    }

    #[test]
    fn test_chat_response_missing_shape_is_placeholder() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp.into_text(), "[No response from provider]");

        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": null}}]
        }))
        .unwrap();
        assert_eq!(resp.into_text(), "[No response from provider]");
    }

    #[test]
    fn test_anthropic_response_text_extraction() {
        let resp: AnthropicMessageResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Hello from Claude"}]
        }))
        .unwrap();
        assert_eq!(resp.into_text(), "Hello from Claude");
    }

    #[test]
    fn test_anthropic_response_non_text_block_is_placeholder() {
        let resp: AnthropicMessageResponse = serde_json::from_value(json!({
            "content": [{"type": "tool_use"}]
        }))
        .unwrap();
        assert_eq!(resp.into_text(), "[Provider replied in an unexpected format]");
    }

    #[test]
    fn test_anthropic_response_empty_content_is_placeholder() {
        let resp: AnthropicMessageResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp.into_text(), "[No response from provider]");
    }

    #[test]
    fn test_error_body_message_extraction() {
        let body = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        assert_eq!(
            WireErrorBody::message_from(body).as_deref(),
            Some("Incorrect API key provided")
        );
        assert!(WireErrorBody::message_from("not json").is_none());
        assert!(WireErrorBody::message_from("{}").is_none());
    }
}
