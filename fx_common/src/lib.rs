//! # fx_common
//!
//! Shared library behind the `fx_watch` tools: currency-pair models, the
//! rate polling driver, the reference-counted subscription manager, the
//! application lifecycle controller and the persisted watchlist.
//!
//! Networking (`retrieve`) and subscriber setup (`loggers`) sit behind cargo
//! features so the core state machines build without an HTTP stack.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod core;
pub mod ingestors;
pub mod markets;
pub mod watchlist;

#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "retrieve")]
pub mod retrieve;

// Re-export the types most callers need.
pub use crate::core::{
    AppPhase, LifecycleController, RateEvent, RateView, Scheduler, SubscriptionManager,
    TokioScheduler,
};
pub use ingestors::{FetchError, FetchErrorKind, PollingDriver, PollingSettings, RateSource};
pub use markets::forex::{ConnectionState, CurrencyPair, RateSnapshot, SupportedPairs};
pub use watchlist::{
    KeyValueStore, WatchlistEntry, WatchlistError, WatchlistSettings, WatchlistStore,
};
