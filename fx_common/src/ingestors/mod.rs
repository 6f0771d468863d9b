//! # Data Ingestors Module
//!
//! This module holds everything between "a pair needs a rate" and "here is a
//! snapshot or a classified error". The transport itself lives behind the
//! `RateSource` trait so the polling logic can be driven by the HTTP sources
//! in `retrieve`, or by scripted sources in tests.
//!
//! ## Contained Modules:
//! - **`fetch_error`**: the `FetchError` taxonomy (quota, service
//!   unavailable, connection failed, invalid response, unknown).
//! - **`fx_polling`**: the `RateSource` seam and the self-scheduling
//!   `PollingDriver` with its timeout and quota backoff.

/// Classified fetch failures and their user-facing messages.
pub mod fetch_error;
/// The polling driver and the rate source seam.
pub mod fx_polling;

// --- Public API Re-exports ---
pub use fetch_error::{FetchError, FetchErrorKind};
pub use fx_polling::{
    Cadence, PollTarget, PollTicket, PollingDriver, PollingSettings, RateSource,
};
