//! Request scheduling for Promptgate.
//!
//! The [`gateway::Gateway`] is the single entry point applications talk to:
//! it owns the process-wide FIFO queue, enforces the minimum spacing between
//! provider calls, batches when asked to, backs off through the retry table,
//! enters a cooldown window on sustained rate limiting, and falls back to the
//! offline responder after too many consecutive failures.
//!
//! [`settings`] holds the mutable per-gateway configuration (provider, model,
//! keys, offline/batch toggles) and its persistable snapshot form.

pub mod gateway;
pub mod settings;

pub use gateway::Gateway;
pub use settings::{Settings, SettingsSnapshot};
