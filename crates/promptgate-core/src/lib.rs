//! Core types and state shared across the Promptgate crates.
//!
//! # Architecture
//!
//! - [`error::ProviderError`]: classified failure taxonomy for provider calls
//! - [`types`]: status snapshot and the wire structs for both provider shapes
//! - [`stats::CallTracker`]: call counters and the consecutive-failure fallback trigger
//! - [`config::SchedulerConfig`]: timing and retry tuning

pub mod config;
pub mod error;
pub mod stats;
pub mod types;

// Re-export main types for convenience
pub use config::SchedulerConfig;
pub use error::ProviderError;
pub use stats::CallTracker;
pub use types::{ApiKeyStatus, CallStats, QueueStatus};
