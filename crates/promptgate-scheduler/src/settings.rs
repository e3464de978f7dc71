//! Mutable gateway settings and their persistable snapshot.
//!
//! Settings keep the raw API keys; the snapshot only says *whether* a key is
//! present, so it can be persisted or shipped to a display layer without
//! leaking secrets. Applying a snapshot merges: unknown providers or models
//! fall back instead of failing, and keys are never touched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use promptgate_providers::registry::{self, ProviderSpec, PROVIDERS};

/// Live, mutable configuration of one gateway.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Currently selected provider.
    pub provider: &'static ProviderSpec,
    /// Currently selected model (always from the provider's catalog).
    pub model: String,
    /// API keys per provider id.
    keys: HashMap<String, String>,
    /// API base overrides per provider id.
    api_bases: HashMap<String, String>,
    /// Organization id, sent only on the OpenAI-shaped wire.
    pub organization: Option<String>,
    /// Offline mode: answer from the canned responder, no provider traffic.
    /// Starts on so a fresh gateway works before any key is configured.
    pub offline: bool,
    /// Process queued entries in bursts instead of one at a time.
    pub batch_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        // First catalog entry is the stock provider.
        let provider = &PROVIDERS[0];
        Settings {
            provider,
            model: provider.default_model.to_string(),
            keys: HashMap::new(),
            api_bases: HashMap::new(),
            organization: None,
            offline: true,
            batch_mode: false,
        }
    }
}

impl Settings {
    /// The key configured for the current provider, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.keys.get(self.provider.id).map(String::as_str)
    }

    /// Whether a key is stored for `provider_id`.
    pub fn has_key(&self, provider_id: &str) -> bool {
        self.keys.contains_key(provider_id)
    }

    /// Store a key for `provider_id`. The caller validates the format first.
    pub fn set_key(&mut self, provider_id: &str, key: String) {
        self.keys.insert(provider_id.to_string(), key);
    }

    /// The API base for the current provider: the override if one is set,
    /// otherwise the provider default.
    pub fn api_base(&self) -> String {
        self.api_bases
            .get(self.provider.id)
            .cloned()
            .unwrap_or_else(|| self.provider.default_api_base.to_string())
    }

    /// Override the API base for `provider_id`.
    pub fn set_api_base(&mut self, provider_id: &str, base: String) {
        self.api_bases.insert(provider_id.to_string(), base);
    }

    /// Snapshot without secrets.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            provider: self.provider.id.to_string(),
            model: self.model.clone(),
            has_key: PROVIDERS
                .iter()
                .map(|spec| (spec.id.to_string(), self.keys.contains_key(spec.id)))
                .collect(),
            organization: self.organization.clone(),
            offline_mode: self.offline,
            batch_mode: self.batch_mode,
        }
    }

    /// Merge a snapshot back in. An unknown provider keeps the current one;
    /// a model missing from the (possibly new) provider's catalog falls back
    /// to that provider's default. Keys and base overrides are untouched.
    pub fn apply(&mut self, snapshot: &SettingsSnapshot) {
        if let Some(spec) = registry::find(&snapshot.provider) {
            self.provider = spec;
        } else {
            tracing::warn!(provider = %snapshot.provider, "snapshot names an unknown provider, keeping current");
        }
        if registry::model_exists(self.provider.id, &snapshot.model) {
            self.model = snapshot.model.clone();
        } else {
            tracing::warn!(
                model = %snapshot.model,
                provider = self.provider.id,
                "snapshot model not in catalog, using provider default"
            );
            self.model = self.provider.default_model.to_string();
        }
        self.organization = snapshot.organization.clone();
        self.offline = snapshot.offline_mode;
        self.batch_mode = snapshot.batch_mode;
    }
}

/// Serializable view of [`Settings`] (camelCase on the wire, no secrets).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub provider: String,
    pub model: String,
    /// Per-provider "a key is stored" flags.
    pub has_key: HashMap<String, bool>,
    pub organization: Option<String>,
    pub offline_mode: bool,
    pub batch_mode: bool,
}
