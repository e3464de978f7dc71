//! Provider registry: static specs for the supported providers.
//!
//! Each [`ProviderSpec`] describes one provider: its wire shape, model
//! catalog, default endpoint, and which API key formats it accepts. Pure
//! lookups only; the settings layer consumes the "not found" booleans.

// ─────────────────────────────────────────────
// ProviderSpec: static metadata for one provider
// ─────────────────────────────────────────────

/// Which wire contract the provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// OpenAI-shaped: `POST {base}/chat/completions`, Bearer auth.
    ChatCompletions,
    /// Anthropic-shaped: `POST {base}/messages`, `x-api-key` auth.
    Messages,
}

/// Recognized API key formats, detected by prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// `sk-ant-api03-…`
    Anthropic,
    /// `sk-proj-…`
    OpenAiProject,
    /// `sk-…` (anything else starting with `sk-`)
    OpenAiStandard,
}

/// One selectable model within a provider's catalog.
#[derive(Clone, Copy, Debug)]
pub struct ModelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Static specification describing one provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal id (e.g. `"openai"`).
    pub id: &'static str,
    /// Human-readable name for logs and error messages.
    pub display_name: &'static str,
    /// Which wire contract to use.
    pub wire: WireFormat,
    /// Default API base URL (overridable per instance in settings).
    pub default_api_base: &'static str,
    /// Selectable models.
    pub models: &'static [ModelSpec],
    /// Model used when the provider is first selected.
    pub default_model: &'static str,
    /// Key formats this provider accepts.
    pub accepted_keys: &'static [KeyKind],
}

// ─────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────

/// Complete list of supported provider specifications.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        id: "openai",
        display_name: "OpenAI",
        wire: WireFormat::ChatCompletions,
        default_api_base: "https://api.openai.com/v1",
        models: &[
            ModelSpec {
                id: "gpt-4",
                name: "GPT-4",
                description: "Most capable, lower rate limits",
            },
            ModelSpec {
                id: "gpt-3.5-turbo",
                name: "GPT-3.5 Turbo",
                description: "Faster, with higher rate limits",
            },
            ModelSpec {
                id: "gpt-4o",
                name: "GPT-4o",
                description: "Newest model, fast and capable",
            },
        ],
        default_model: "gpt-3.5-turbo",
        accepted_keys: &[KeyKind::OpenAiStandard, KeyKind::OpenAiProject],
    },
    ProviderSpec {
        id: "anthropic",
        display_name: "Anthropic (Claude)",
        wire: WireFormat::Messages,
        default_api_base: "https://api.anthropic.com/v1",
        models: &[
            ModelSpec {
                id: "claude-3-opus-20240229",
                name: "Claude 3 Opus",
                description: "Most powerful, for complex tasks",
            },
            ModelSpec {
                id: "claude-3-sonnet-20240229",
                name: "Claude 3 Sonnet",
                description: "Balance of intelligence and speed",
            },
            ModelSpec {
                id: "claude-3-haiku-20240307",
                name: "Claude 3 Haiku",
                description: "Fastest and most compact model",
            },
        ],
        default_model: "claude-3-haiku-20240307",
        accepted_keys: &[KeyKind::Anthropic],
    },
];

// ─────────────────────────────────────────────
// Lookups
// ─────────────────────────────────────────────

/// Find a provider spec by id.
pub fn find(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.id == id)
}

/// Whether a provider with this id exists.
pub fn provider_exists(id: &str) -> bool {
    find(id).is_some()
}

/// Whether `model_id` is in `provider_id`'s catalog.
pub fn model_exists(provider_id: &str, model_id: &str) -> bool {
    find(provider_id)
        .map(|spec| spec.models.iter().any(|m| m.id == model_id))
        .unwrap_or(false)
}

/// The default model for a provider, if the provider exists.
pub fn default_model(provider_id: &str) -> Option<&'static str> {
    find(provider_id).map(|spec| spec.default_model)
}

// ─────────────────────────────────────────────
// Key heuristics
// ─────────────────────────────────────────────

/// Detect the key format by prefix. Order matters: the Anthropic and project
/// prefixes both start with `sk-`, so they are checked first.
pub fn detect_key_kind(key: &str) -> Option<KeyKind> {
    if key.starts_with("sk-ant-api03-") {
        Some(KeyKind::Anthropic)
    } else if key.starts_with("sk-proj-") {
        Some(KeyKind::OpenAiProject)
    } else if key.starts_with("sk-") {
        Some(KeyKind::OpenAiStandard)
    } else {
        None
    }
}

/// Whether `key` has a format the provider accepts.
pub fn key_matches_provider(spec: &ProviderSpec, key: &str) -> bool {
    match detect_key_kind(key) {
        Some(kind) => spec.accepted_keys.contains(&kind),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_providers() {
        assert_eq!(find("openai").unwrap().display_name, "OpenAI");
        assert_eq!(find("anthropic").unwrap().wire, WireFormat::Messages);
        assert!(find("mistral").is_none());
    }

    #[test]
    fn test_provider_exists() {
        assert!(provider_exists("openai"));
        assert!(!provider_exists("OPENAI"));
        assert!(!provider_exists(""));
    }

    #[test]
    fn test_model_exists() {
        assert!(model_exists("openai", "gpt-4o"));
        assert!(model_exists("anthropic", "claude-3-opus-20240229"));
        assert!(!model_exists("openai", "claude-3-haiku-20240307"));
        assert!(!model_exists("nope", "gpt-4o"));
    }

    #[test]
    fn test_default_models() {
        assert_eq!(default_model("openai"), Some("gpt-3.5-turbo"));
        assert_eq!(default_model("anthropic"), Some("claude-3-haiku-20240307"));
        assert_eq!(default_model("nope"), None);
    }

    #[test]
    fn test_default_model_is_in_catalog() {
        for spec in PROVIDERS {
            assert!(
                spec.models.iter().any(|m| m.id == spec.default_model),
                "default model of {} not in its catalog",
                spec.id
            );
        }
    }

    #[test]
    fn test_detect_key_kind_ordering() {
        assert_eq!(
            detect_key_kind("sk-ant-api03-abc123"),
            Some(KeyKind::Anthropic)
        );
        assert_eq!(detect_key_kind("sk-proj-abc123"), Some(KeyKind::OpenAiProject));
        assert_eq!(detect_key_kind("sk-abc123"), Some(KeyKind::OpenAiStandard));
        assert_eq!(detect_key_kind("garbage"), None);
        assert_eq!(detect_key_kind(""), None);
    }

    #[test]
    fn test_key_matches_provider() {
        let openai = find("openai").unwrap();
        let anthropic = find("anthropic").unwrap();

        assert!(key_matches_provider(openai, "sk-abc123"));
        assert!(key_matches_provider(openai, "sk-proj-abc123"));
        assert!(!key_matches_provider(openai, "sk-ant-api03-abc123"));

        assert!(key_matches_provider(anthropic, "sk-ant-api03-abc123"));
        assert!(!key_matches_provider(anthropic, "sk-abc123"));
        assert!(!key_matches_provider(anthropic, "garbage"));
    }
}
