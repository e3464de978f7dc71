//! Provider layer for Promptgate.
//!
//! # Architecture
//!
//! - [`registry`]: static catalog of the supported providers + key heuristics
//! - [`traits::ChatBackend`]: one classified attempt against a provider
//! - [`transport::HttpTransport`]: the real HTTP implementation of the trait
//! - [`retry`]: bounded table-driven retry loop around a backend
//! - [`offline`]: canned responder used in offline mode and as terminal fallback

pub mod offline;
pub mod registry;
pub mod retry;
pub mod traits;
pub mod transport;

// Re-export main types for convenience
pub use offline::{CannedResponder, OfflineResponder};
pub use registry::{KeyKind, ModelSpec, ProviderSpec, WireFormat, PROVIDERS};
pub use retry::{run_with_retry, RetryVerdict};
pub use traits::{ChatBackend, RequestContext};
pub use transport::HttpTransport;
