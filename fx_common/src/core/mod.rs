//! # Core Engine Module
//!
//! This module holds the stateful part of the rate pipeline: who is
//! subscribed to which pair, when each pair is polled, and how application
//! phase changes pause and resume that polling.
//!
//! ## Core Components:
//!
//! - **`scheduler`**: the `Scheduler` capability (start a repeating per-pair
//!   tick, cancel it) and `TokioScheduler`, its tokio task implementation.
//!
//! - **`registry`**: the `SubscriptionManager`, a reference-counted rate
//!   cache. The first subscriber of a pair starts its polling schedule and
//!   the last one tears it down. Results from a torn-down schedule are
//!   discarded.
//!
//! - **`lifecycle`**: the `LifecycleController`, which turns foreground and
//!   background transitions into global pause and resume calls.

/// Per-pair repeating ticks.
pub mod scheduler;
/// Reference-counted subscriptions and the rate cache.
pub mod registry;
/// Application phase handling.
pub mod lifecycle;

// --- Public API Re-exports ---
pub use lifecycle::{AppPhase, LifecycleController};
pub use registry::{RateEvent, RateView, SubscriptionManager};
pub use scheduler::{NextTick, ScheduleHandle, Scheduler, Tick, TickFuture, TokioScheduler};
