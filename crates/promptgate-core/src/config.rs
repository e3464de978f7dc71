//! Scheduler tuning: every timing and retry knob in one serde struct.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case. Durations are
//! stored as integer milliseconds, which keeps the persisted form trivial for
//! the external settings store.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry tuning for the gateway.
///
/// The defaults reproduce the production constants: 2 s spacing, batches of 3,
/// 60 s cooldown probed every 5 s, retry backoff of 3/7/15/30 s, and offline
/// fallback after 3 consecutive failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Minimum gap between two real provider calls, in milliseconds.
    pub min_request_interval_ms: u64,
    /// Maximum entries processed as one burst in batch mode.
    pub batch_size: usize,
    /// Cooldown window entered after sustained rate limiting, in milliseconds.
    pub cooldown_period_ms: u64,
    /// How often a tick re-probes an active cooldown, in milliseconds.
    pub cooldown_probe_ms: u64,
    /// Backoff delays indexed by retry attempt, in milliseconds.
    /// The table length is also the retry cap.
    pub retry_delays_ms: Vec<u64>,
    /// Consecutive failed/rate-limited calls before forcing offline mode.
    pub max_failed_calls_before_fallback: u32,
    /// Delay between items inside a batch, in milliseconds.
    pub batch_item_delay_ms: u64,
    /// Simulated latency of the offline responder, in milliseconds.
    pub offline_response_delay_ms: u64,
    /// Delay before the follow-up tick after a single-path completion,
    /// in milliseconds.
    pub reschedule_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 2_000,
            batch_size: 3,
            cooldown_period_ms: 60_000,
            cooldown_probe_ms: 5_000,
            retry_delays_ms: vec![3_000, 7_000, 15_000, 30_000],
            max_failed_calls_before_fallback: 3,
            batch_item_delay_ms: 500,
            offline_response_delay_ms: 500,
            reschedule_delay_ms: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn cooldown_period(&self) -> Duration {
        Duration::from_millis(self.cooldown_period_ms)
    }

    pub fn cooldown_probe(&self) -> Duration {
        Duration::from_millis(self.cooldown_probe_ms)
    }

    pub fn retry_delay(&self, attempt: usize) -> Option<Duration> {
        self.retry_delays_ms
            .get(attempt)
            .map(|ms| Duration::from_millis(*ms))
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.retry_delays_ms.len()
    }

    pub fn batch_item_delay(&self) -> Duration {
        Duration::from_millis(self.batch_item_delay_ms)
    }

    pub fn offline_response_delay(&self) -> Duration {
        Duration::from_millis(self.offline_response_delay_ms)
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_millis(self.reschedule_delay_ms)
    }

    /// A config with zero delays and no retries, for tests that only care
    /// about ordering and state transitions.
    pub fn immediate() -> Self {
        Self {
            min_request_interval_ms: 0,
            cooldown_probe_ms: 1,
            retry_delays_ms: Vec::new(),
            batch_item_delay_ms: 0,
            offline_response_delay_ms: 0,
            reschedule_delay_ms: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_constants() {
        let config = SchedulerConfig::default();
        assert_eq!(config.min_request_interval(), Duration::from_secs(2));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.cooldown_period(), Duration::from_secs(60));
        assert_eq!(config.retry_delays_ms, vec![3_000, 7_000, 15_000, 30_000]);
        assert_eq!(config.max_retries(), 4);
        assert_eq!(config.max_failed_calls_before_fallback, 3);
    }

    #[test]
    fn test_retry_delay_indexing() {
        let config = SchedulerConfig::default();
        assert_eq!(config.retry_delay(0), Some(Duration::from_secs(3)));
        assert_eq!(config.retry_delay(3), Some(Duration::from_secs(30)));
        assert_eq!(config.retry_delay(4), None);
    }

    #[test]
    fn test_camel_case_round_trip() {
        let json = r#"{"minRequestIntervalMs": 100, "batchSize": 2}"#;
        let config: SchedulerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.min_request_interval_ms, 100);
        assert_eq!(config.batch_size, 2);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.cooldown_period_ms, 60_000);

        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("minRequestIntervalMs").is_some());
        assert!(value.get("maxFailedCallsBeforeFallback").is_some());
    }

    #[test]
    fn test_immediate_profile() {
        let config = SchedulerConfig::immediate();
        assert_eq!(config.max_retries(), 0);
        assert_eq!(config.min_request_interval(), Duration::ZERO);
    }
}
