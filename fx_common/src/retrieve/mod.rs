//! # Data Retrieval Module
//!
//! HTTP plumbing for the forex rate sources. Everything here sits behind
//! the `retrieve` feature.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: `ApiClient`, a `reqwest` wrapper with a base URL, the
//!   provider `token` header and a per-request timeout. Returns status and
//!   raw body so callers classify failures themselves.
//! - **`rate_sources`**: `ProxyRateSource` and `ProviderRateSource`, the two
//!   `RateSource` implementations used by the polling driver.
//! - **`event_stream`**: the server-sent-event reader for the streaming
//!   variant of the proxy endpoint.

/// HTTP client wrapper.
pub mod ky_http;
/// HTTP-backed rate sources.
pub mod rate_sources;
/// Server-sent-event rate stream.
pub mod event_stream;

// --- Public API Re-exports ---
pub use event_stream::{open_rate_stream, SseDecoder};
pub use ky_http::{ApiClient, ApiResponse, ClientError};
pub use rate_sources::{ProviderRateSource, ProxyRateSource};
