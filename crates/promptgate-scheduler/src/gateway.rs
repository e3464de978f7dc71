//! The gateway: a process-wide FIFO request scheduler in front of the
//! provider layer.
//!
//! Every prompt goes through one queue. A tick drains it while enforcing:
//!
//! - minimum spacing between real provider calls,
//! - an optional batch path that bursts several entries with a short
//!   intra-batch delay,
//! - a cooldown window after sustained rate limiting (the queue is held, not
//!   dropped, and re-probed until the window expires),
//! - automatic one-shot fallback to the offline responder once the
//!   consecutive-failure threshold is crossed.
//!
//! Locking rule: the state mutex is only ever held inside synchronous blocks,
//! never across an await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use promptgate_core::config::SchedulerConfig;
use promptgate_core::error::ProviderError;
use promptgate_core::stats::CallTracker;
use promptgate_core::types::{ApiKeyStatus, CallStats, QueueStatus};
use promptgate_providers::offline::{CannedResponder, OfflineResponder};
use promptgate_providers::registry::{self, key_matches_provider};
use promptgate_providers::retry::{run_with_retry, RetryVerdict};
use promptgate_providers::traits::{ChatBackend, RequestContext};
use promptgate_providers::transport::HttpTransport;

use crate::settings::{Settings, SettingsSnapshot};

/// One queued prompt and the channel its answer is delivered on.
struct QueueEntry {
    prompt: String,
    done: oneshot::Sender<String>,
}

/// Mutable scheduler state, guarded by one mutex.
struct State {
    settings: Settings,
    queue: VecDeque<QueueEntry>,
    /// Re-entrancy guard: a tick is currently executing entries.
    processing: bool,
    paused: bool,
    /// When the last entry finished, for spacing.
    last_request_at: Option<Instant>,
    /// End of the active cooldown window, if any.
    cooldown_until: Option<Instant>,
    rate_limit_hit: bool,
    last_error: Option<String>,
    api_key_status: ApiKeyStatus,
    /// Submissions not yet answered, including any in flight.
    pending: u64,
}

struct Inner {
    config: SchedulerConfig,
    tracker: CallTracker,
    backend: Arc<dyn ChatBackend>,
    responder: Arc<dyn OfflineResponder>,
    state: Mutex<State>,
}

/// The request gateway. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    /// Gateway with the real HTTP transport and the stock offline responder.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(HttpTransport::new()),
            Arc::new(CannedResponder::new()),
        )
    }

    /// Gateway over explicit backend and responder implementations.
    pub fn with_parts(
        config: SchedulerConfig,
        backend: Arc<dyn ChatBackend>,
        responder: Arc<dyn OfflineResponder>,
    ) -> Self {
        let tracker = CallTracker::new(config.max_failed_calls_before_fallback);
        Gateway {
            inner: Arc::new(Inner {
                config,
                tracker,
                backend,
                responder,
                state: Mutex::new(State {
                    settings: Settings::default(),
                    queue: VecDeque::new(),
                    processing: false,
                    paused: false,
                    last_request_at: None,
                    cooldown_until: None,
                    rate_limit_hit: false,
                    last_error: None,
                    api_key_status: ApiKeyStatus::Unknown,
                    pending: 0,
                }),
            }),
        }
    }

    // ─────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────

    /// Queue a prompt and wait for its answer. Errors come back as formatted
    /// `[ERROR]`/`[SYSTEM]` strings, never as a broken channel.
    pub async fn submit(&self, prompt: impl Into<String>) -> String {
        self.enqueue(prompt)
            .await
            .unwrap_or_else(|_| "[ERROR] Request was dropped before completion.".to_string())
    }

    /// Queue a prompt, returning the answer channel immediately. Online
    /// submissions are prechecked: a missing or mismatched key resolves the
    /// channel right away without touching the queue.
    pub fn enqueue(&self, prompt: impl Into<String>) -> oneshot::Receiver<String> {
        let prompt = prompt.into();
        let (done, rx) = oneshot::channel();

        {
            let mut state = self.lock();
            if !state.settings.offline {
                if let Some(key) = state.settings.api_key() {
                    if !key_matches_provider(state.settings.provider, key) {
                        let msg = format!(
                            "[ERROR] Invalid API key format for {}.",
                            state.settings.provider.display_name
                        );
                        state.api_key_status = ApiKeyStatus::Invalid;
                        state.last_error = Some(msg.clone());
                        let _ = done.send(msg);
                        return rx;
                    }
                } else {
                    let msg = format!(
                        "[ERROR] No API key configured for {}. Please add your API key.",
                        state.settings.provider.display_name
                    );
                    state.last_error = Some(msg.clone());
                    let _ = done.send(msg);
                    return rx;
                }
            }

            state.queue.push_back(QueueEntry { prompt, done });
            state.pending += 1;
            debug!(queue_length = state.queue.len(), "prompt queued");
        }

        self.inner.kick_after(Duration::ZERO);
        rx
    }

    // ─────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────

    /// Snapshot of the scheduler for display layers. Reading the status also
    /// expires a finished cooldown, so the flags never show a stale window.
    pub fn status(&self) -> QueueStatus {
        let mut state = self.lock();
        let now = Instant::now();
        if let Some(until) = state.cooldown_until {
            if now >= until {
                state.cooldown_until = None;
                state.rate_limit_hit = false;
            }
        }
        let cooldown_remaining = state
            .cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        QueueStatus {
            queue_length: state.queue.len(),
            total_queued: state.pending,
            currently_processing: state.processing,
            estimated_time_remaining: self.inner.config.min_request_interval()
                * state.queue.len() as u32,
            last_error: state.last_error.clone(),
            rate_limit_hit: state.rate_limit_hit,
            cooldown_remaining,
            api_key_status: state.api_key_status,
            call_stats: self.inner.tracker.snapshot(),
            batch_mode: state.settings.batch_mode,
            paused: state.paused,
            offline_mode: state.settings.offline,
            provider: state.settings.provider.id.to_string(),
            model: state.settings.model.clone(),
        }
    }

    /// Counters for real provider traffic.
    pub fn call_stats(&self) -> CallStats {
        self.inner.tracker.snapshot()
    }

    pub fn reset_call_stats(&self) {
        self.inner.tracker.reset();
    }

    // ─────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────

    /// Switch provider. The model snaps to the new provider's default, and
    /// any limiting state inherited from the old provider (cooldown, error,
    /// failure streak) is discarded with it.
    pub fn set_provider(&self, provider_id: &str) -> Result<(), ProviderError> {
        let spec = registry::find(provider_id)
            .ok_or_else(|| ProviderError::UnknownProvider(provider_id.to_string()))?;
        let mut state = self.lock();
        state.settings.provider = spec;
        state.settings.model = spec.default_model.to_string();
        state.api_key_status = ApiKeyStatus::Unknown;
        state.cooldown_until = None;
        state.rate_limit_hit = false;
        state.last_error = None;
        self.inner.tracker.clear_consecutive();
        info!(provider = spec.id, model = %state.settings.model, "provider selected");
        Ok(())
    }

    /// Select a model from the current provider's catalog. Clears any active
    /// cooldown, since a different model has its own rate limits.
    pub fn set_model(&self, model_id: &str) -> Result<(), ProviderError> {
        let mut state = self.lock();
        if !registry::model_exists(state.settings.provider.id, model_id) {
            return Err(ProviderError::UnknownModel {
                provider: state.settings.provider.id.to_string(),
                model: model_id.to_string(),
            });
        }
        state.settings.model = model_id.to_string();
        state.cooldown_until = None;
        state.rate_limit_hit = false;
        info!(model = model_id, "model selected");
        Ok(())
    }

    /// Store an API key for `provider_id`. Returns `false` (state unchanged)
    /// when the provider is unknown or the key format does not match it.
    /// Any accepted key turns offline mode off and clears the failure streak;
    /// the key status only flips to valid when the key is for the currently
    /// selected provider.
    pub fn set_api_key(&self, provider_id: &str, key: &str) -> bool {
        let Some(spec) = registry::find(provider_id) else {
            return false;
        };
        if !key_matches_provider(spec, key) {
            warn!(provider = provider_id, "rejected API key with wrong format");
            return false;
        }

        let kick = {
            let mut state = self.lock();
            state.settings.set_key(provider_id, key.to_string());
            state.settings.offline = false;
            self.inner.tracker.clear_consecutive();
            if state.settings.provider.id == provider_id {
                state.api_key_status = ApiKeyStatus::Valid;
                state.last_error = None;
            }
            info!(provider = provider_id, "API key set, leaving offline mode");
            !state.paused
        };
        if kick {
            self.inner.kick_after(Duration::ZERO);
        }
        true
    }

    /// Override the API base URL for `provider_id`.
    pub fn set_api_base(&self, provider_id: &str, base: &str) -> bool {
        if !registry::provider_exists(provider_id) {
            return false;
        }
        self.lock().settings.set_api_base(provider_id, base.to_string());
        true
    }

    /// Set or clear the organization id. The id is trimmed; an empty or
    /// whitespace-only value clears it, so a blank never reaches the
    /// `OpenAI-Organization` header.
    pub fn set_organization_id(&self, organization: Option<String>) {
        let organization = organization
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self.lock().settings.organization = organization;
    }

    /// Toggle offline mode. Turning it on also clears any cooldown, since the
    /// canned responder is never rate limited. Turning it off re-derives the
    /// key status from whether a key is stored for the current provider.
    pub fn set_offline_mode(&self, offline: bool) {
        {
            let mut state = self.lock();
            state.settings.offline = offline;
            if offline {
                state.cooldown_until = None;
                state.rate_limit_hit = false;
            } else {
                state.api_key_status = if state.settings.api_key().is_some() {
                    ApiKeyStatus::Valid
                } else {
                    ApiKeyStatus::Unknown
                };
            }
            info!(offline, "offline mode toggled");
        }
        self.inner.kick_after(Duration::ZERO);
    }

    pub fn set_batch_mode(&self, batch: bool) {
        self.lock().settings.batch_mode = batch;
    }

    /// Stop draining the queue. Submissions still enqueue.
    pub fn pause(&self) {
        self.lock().paused = true;
        info!("queue paused");
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        info!("queue resumed");
        self.inner.kick_after(Duration::ZERO);
    }

    /// Clear every error flag, end any cooldown, unpause, and cancel the
    /// queue. Each cancelled entry resolves with a `[SYSTEM]` notice rather
    /// than an error, so callers treat the cancellation as a completed
    /// request.
    pub fn reset_status(&self) {
        let cancelled: Vec<QueueEntry> = {
            let mut state = self.lock();
            state.cooldown_until = None;
            state.rate_limit_hit = false;
            state.last_error = None;
            state.api_key_status = ApiKeyStatus::Unknown;
            state.paused = false;
            self.inner.tracker.clear_consecutive();
            let drained: Vec<QueueEntry> = state.queue.drain(..).collect();
            state.pending = state.pending.saturating_sub(drained.len() as u64);
            drained
        };
        info!(cancelled = cancelled.len(), "status reset, queue cancelled");
        for entry in cancelled {
            let _ = entry
                .done
                .send("[SYSTEM] API status reset. Please resubmit your request.".to_string());
        }
        self.inner.kick_after(Duration::ZERO);
    }

    /// Settings snapshot without secrets.
    pub fn settings_snapshot(&self) -> SettingsSnapshot {
        self.lock().settings.snapshot()
    }

    /// Merge a previously captured snapshot back in.
    pub fn apply_snapshot(&self, snapshot: &SettingsSnapshot) {
        self.lock().settings.apply(snapshot);
        self.inner.kick_after(Duration::ZERO);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("gateway state lock poisoned")
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("gateway state lock poisoned")
    }

    /// Schedule a tick after `delay` on the runtime.
    fn kick_after(self: &Arc<Self>, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            Inner::tick(inner).await;
        });
    }

    /// One scheduling pass: honor pause/cooldown, wait out the spacing gap,
    /// then run a single entry or a batch.
    async fn tick(inner: Arc<Self>) {
        // Phase 1: decide under the lock.
        let spacing_wait = {
            let mut state = inner.lock();
            if state.processing || state.paused || state.queue.is_empty() {
                return;
            }
            if let Some(until) = state.cooldown_until {
                let now = Instant::now();
                if now < until {
                    let remaining = until.saturating_duration_since(now);
                    let probe = inner.config.cooldown_probe().min(remaining);
                    debug!(remaining_ms = remaining.as_millis() as u64, "cooling down, probing later");
                    drop(state);
                    inner.kick_after(probe);
                    return;
                }
                state.cooldown_until = None;
                state.rate_limit_hit = false;
                info!("cooldown expired, resuming queue");
            }
            state.processing = true;
            state
                .last_request_at
                .map(|at| inner.config.min_request_interval().saturating_sub(at.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if spacing_wait > Duration::ZERO {
            debug!(wait_ms = spacing_wait.as_millis() as u64, "spacing delay");
            tokio::time::sleep(spacing_wait).await;
        }

        // Phase 2: pick the path.
        let batch = {
            let mut state = inner.lock();
            if state.settings.batch_mode && state.queue.len() > 1 {
                let take = inner.config.batch_size.min(state.queue.len());
                let entries: Vec<QueueEntry> = state.queue.drain(..take).collect();
                Some(entries)
            } else {
                state.queue.pop_front().map(|entry| vec![entry])
            }
        };

        let Some(batch) = batch else {
            inner.lock().processing = false;
            return;
        };
        let was_batch = batch.len() > 1;
        debug!(size = batch.len(), batch = was_batch, "processing entries");

        let mut items = batch.into_iter();
        let mut first = true;
        while let Some(entry) = items.next() {
            if !first {
                tokio::time::sleep(inner.config.batch_item_delay()).await;
            }
            first = false;

            let keep_going = Inner::execute_one(&inner, entry).await;
            if !keep_going {
                // Cooldown started mid-batch: the unprocessed tail goes back
                // to the front of the queue in its original order.
                let tail: Vec<QueueEntry> = items.collect();
                if !tail.is_empty() {
                    let mut state = inner.lock();
                    for entry in tail.into_iter().rev() {
                        state.queue.push_front(entry);
                    }
                    warn!(requeued = state.queue.len(), "batch aborted by rate limit");
                }
                break;
            }
        }

        let reschedule = {
            let mut state = inner.lock();
            state.last_request_at = Some(Instant::now());
            state.processing = false;
            !state.queue.is_empty()
        };
        if reschedule {
            let delay = if was_batch {
                inner.config.min_request_interval()
            } else {
                inner.config.reschedule_delay()
            };
            inner.kick_after(delay);
        }
    }

    /// Answer one entry. Returns `false` when a cooldown was entered and any
    /// in-flight batch must stop.
    async fn execute_one(inner: &Arc<Self>, entry: QueueEntry) -> bool {
        // Snapshot what the attempt needs; settings may change while we wait.
        let (offline, provider, model, key, organization, api_base) = {
            let state = inner.lock();
            (
                state.settings.offline,
                state.settings.provider,
                state.settings.model.clone(),
                state.settings.api_key().map(str::to_string),
                state.settings.organization.clone(),
                state.settings.api_base(),
            )
        };

        if offline {
            tokio::time::sleep(inner.config.offline_response_delay()).await;
            let text = inner.responder.respond(&entry.prompt);
            inner.finish(entry, text);
            return true;
        }

        let Some(key) = key else {
            // The key was removed or the provider switched after submission.
            let msg = format!(
                "[ERROR] No API key configured for {}. Please add your API key.",
                provider.display_name
            );
            inner.lock().last_error = Some(msg.clone());
            inner.finish(entry, msg);
            return true;
        };

        let ctx = RequestContext {
            provider,
            model: &model,
            api_key: &key,
            organization: organization.as_deref(),
            api_base: &api_base,
        };
        let verdict =
            run_with_retry(inner.backend.as_ref(), &entry.prompt, &ctx, &inner.config, &inner.tracker)
                .await;

        match verdict {
            RetryVerdict::Completed(text) => {
                {
                    let mut state = inner.lock();
                    state.rate_limit_hit = false;
                    state.last_error = None;
                    state.api_key_status = ApiKeyStatus::Valid;
                }
                inner.finish(entry, text);
                true
            }
            RetryVerdict::FallbackOffline => {
                warn!("switching to offline mode after repeated failures");
                {
                    let mut state = inner.lock();
                    state.settings.offline = true;
                    state.cooldown_until = None;
                    state.rate_limit_hit = false;
                    state.last_error =
                        Some("[SYSTEM] Switched to offline mode after repeated API failures.".to_string());
                }
                // The triggering request still gets an answer, from the
                // canned responder.
                tokio::time::sleep(inner.config.offline_response_delay()).await;
                let text = inner.responder.respond(&entry.prompt);
                inner.finish(entry, text);
                true
            }
            RetryVerdict::CooldownRequired(_) => {
                let msg = format!(
                    "[ERROR] API rate limit reached. Wait {} seconds and try again. (HTTP 429)",
                    inner.config.cooldown_period().as_secs()
                );
                {
                    let mut state = inner.lock();
                    state.cooldown_until = Some(Instant::now() + inner.config.cooldown_period());
                    state.rate_limit_hit = true;
                    state.api_key_status = ApiKeyStatus::RateLimited;
                    state.last_error = Some(msg.clone());
                }
                warn!(
                    cooldown_s = inner.config.cooldown_period().as_secs(),
                    "entering cooldown window"
                );
                inner.finish(entry, msg);
                false
            }
            RetryVerdict::Failed(err) => {
                let msg = inner.failure_message(&err);
                {
                    let mut state = inner.lock();
                    if matches!(
                        err,
                        ProviderError::Unauthorized(_) | ProviderError::MalformedKey(_)
                    ) {
                        state.api_key_status = ApiKeyStatus::Invalid;
                    }
                    state.last_error = Some(msg.clone());
                }
                inner.finish(entry, msg);
                true
            }
        }
    }

    /// Deliver an answer and release the pending slot.
    fn finish(&self, entry: QueueEntry, text: String) {
        let _ = entry.done.send(text);
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);
    }

    fn failure_message(&self, err: &ProviderError) -> String {
        match err {
            ProviderError::Unauthorized(_) => {
                "[ERROR] Invalid API key or insufficient permissions. Check your API key and try again."
                    .to_string()
            }
            ProviderError::MalformedKey(detail) => {
                format!("[ERROR] Invalid API key format: {detail}.")
            }
            ProviderError::RateLimited { .. } => format!(
                "[ERROR] API rate limit reached. Wait {} seconds and try again. (HTTP 429)",
                self.config.cooldown_period().as_secs()
            ),
            ProviderError::Transport(detail) => {
                format!("[ERROR] API request failed: {detail}")
            }
            ProviderError::UnknownProvider(id) => format!("[ERROR] Unknown provider: {id}"),
            ProviderError::UnknownModel { provider, model } => {
                format!("[ERROR] Model {model} is not available for {provider}")
            }
        }
    }
}
