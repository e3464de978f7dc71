//! Bounded retry around a [`ChatBackend`]: a flat iterative loop with a
//! fixed delay table, never recursion.
//!
//! Only rate-limited attempts are retried. The loop also owns the per-attempt
//! bookkeeping on the shared [`CallTracker`], so crossing the consecutive-
//! failure threshold surfaces here as [`RetryVerdict::FallbackOffline`] and
//! the scheduler can synthesize an offline response instead of failing.

use tracing::{debug, warn};

use promptgate_core::config::SchedulerConfig;
use promptgate_core::error::ProviderError;
use promptgate_core::stats::CallTracker;

use crate::registry::key_matches_provider;
use crate::traits::{ChatBackend, RequestContext};

/// Outcome of a retried call, for the scheduler to act on.
#[derive(Debug)]
pub enum RetryVerdict {
    /// The provider answered; consecutive-failure streak was reset.
    Completed(String),
    /// Non-retryable failure (malformed key, auth, generic transport).
    Failed(ProviderError),
    /// Rate limited and retries are exhausted: enter the cooldown window.
    CooldownRequired(ProviderError),
    /// The consecutive-failure threshold was crossed during this call: the
    /// caller must switch to offline mode and answer from the canned
    /// responder instead of failing.
    FallbackOffline,
}

/// Drive one prompt to a verdict, retrying rate-limited attempts with the
/// config's delay table (a provider-supplied retry-after wins over the table).
///
/// The number of retries after the first attempt equals the table length.
pub async fn run_with_retry(
    backend: &dyn ChatBackend,
    prompt: &str,
    ctx: &RequestContext<'_>,
    config: &SchedulerConfig,
    tracker: &CallTracker,
) -> RetryVerdict {
    // Fail fast on a malformed key: no attempt is counted or sent.
    if !key_matches_provider(ctx.provider, ctx.api_key) {
        return RetryVerdict::Failed(ProviderError::MalformedKey(format!(
            "key does not match the {} format",
            ctx.provider.display_name
        )));
    }

    let mut attempt: usize = 0;
    loop {
        debug!(
            provider = ctx.provider.id,
            model = ctx.model,
            attempt = attempt + 1,
            max_attempts = config.max_retries() + 1,
            "provider attempt"
        );
        tracker.record_attempt();

        match backend.attempt(prompt, ctx).await {
            Ok(text) => {
                tracker.record_success();
                return RetryVerdict::Completed(text);
            }
            Err(err) if err.is_rate_limited() => {
                if tracker.record_rate_limited() {
                    warn!(
                        provider = ctx.provider.id,
                        "failure threshold crossed while rate limited, falling back offline"
                    );
                    return RetryVerdict::FallbackOffline;
                }
                match config.retry_delay(attempt) {
                    Some(table_delay) => {
                        let wait = match &err {
                            ProviderError::RateLimited {
                                retry_after: Some(d),
                            } => *d,
                            _ => table_delay,
                        };
                        warn!(
                            provider = ctx.provider.id,
                            wait_ms = wait.as_millis() as u64,
                            "rate limited, retrying after backoff"
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(provider = ctx.provider.id, "rate limited, retries exhausted");
                        return RetryVerdict::CooldownRequired(err);
                    }
                }
            }
            Err(err @ ProviderError::MalformedKey(_)) => {
                // Key went bad between the fast check and the attempt;
                // not counted as provider traffic, mirroring the fast path.
                return RetryVerdict::Failed(err);
            }
            Err(err) => {
                if tracker.record_failure() {
                    warn!(
                        provider = ctx.provider.id,
                        error = %err,
                        "failure threshold crossed, falling back offline"
                    );
                    return RetryVerdict::FallbackOffline;
                }
                return RetryVerdict::Failed(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, ProviderError>>) -> Self {
            ScriptedBackend {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn attempt(
            &self,
            _prompt: &str,
            _ctx: &RequestContext<'_>,
        ) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("unscripted".to_string()))
        }
    }

    fn ctx<'a>(key: &'a str) -> RequestContext<'a> {
        RequestContext {
            provider: find("openai").unwrap(),
            model: "gpt-4o",
            api_key: key,
            organization: None,
            api_base: "http://unused.invalid",
        }
    }

    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited { retry_after: None }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_rate_limits() {
        let backend = ScriptedBackend::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Ok("done".to_string()),
        ]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(10);
        let started = Instant::now();

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(verdict, RetryVerdict::Completed(ref t) if t == "done"));
        assert_eq!(backend.call_count(), 3);
        // Table-driven waits: 3 s after attempt 1, 7 s after attempt 2.
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        let stats = tracker.snapshot();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.rate_limited, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_retry_after_wins_over_table() {
        let backend = ScriptedBackend::new(vec![
            Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(1)),
            }),
            Ok("done".to_string()),
        ]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(10);
        let started = Instant::now();

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(verdict, RetryVerdict::Completed(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_escalate_to_cooldown() {
        let backend = ScriptedBackend::new(vec![Err(rate_limited()), Err(rate_limited())]);
        let config = SchedulerConfig {
            retry_delays_ms: vec![1],
            ..SchedulerConfig::default()
        };
        let tracker = CallTracker::new(10);

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(
            verdict,
            RetryVerdict::CooldownRequired(ProviderError::RateLimited { .. })
        ));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(tracker.snapshot().rate_limited, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_crossed_mid_retry_falls_back() {
        let backend = ScriptedBackend::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Ok("never reached".to_string()),
        ]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(2);

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(verdict, RetryVerdict::FallbackOffline));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_without_retry() {
        let backend =
            ScriptedBackend::new(vec![Err(ProviderError::Unauthorized("bad key".into()))]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(10);

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(
            verdict,
            RetryVerdict::Failed(ProviderError::Unauthorized(_))
        ));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(tracker.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_generic_failure_crossing_threshold_falls_back() {
        let backend =
            ScriptedBackend::new(vec![Err(ProviderError::Transport("boom".into()))]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(1);

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(verdict, RetryVerdict::FallbackOffline));
    }

    #[tokio::test]
    async fn test_malformed_key_fails_fast_without_attempt() {
        let backend = ScriptedBackend::new(vec![]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(10);

        let verdict = run_with_retry(&backend, "hi", &ctx("garbage"), &config, &tracker).await;

        assert!(matches!(
            verdict,
            RetryVerdict::Failed(ProviderError::MalformedKey(_))
        ));
        assert_eq!(backend.call_count(), 0);
        assert_eq!(tracker.snapshot().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_text_heuristic_is_retried() {
        // A Transport error whose text smells like a rate limit goes through
        // the same retry policy as a real 429.
        let backend = ScriptedBackend::new(vec![
            Err(ProviderError::Transport("upstream said 429".into())),
            Ok("done".to_string()),
        ]);
        let config = SchedulerConfig::default();
        let tracker = CallTracker::new(10);

        let verdict = run_with_retry(&backend, "hi", &ctx("sk-test"), &config, &tracker).await;

        assert!(matches!(verdict, RetryVerdict::Completed(_)));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(tracker.snapshot().rate_limited, 1);
    }
}
