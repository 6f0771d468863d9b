//! # Poll Scheduler
//!
//! The `Scheduler` capability runs a per-pair tick callback repeatedly until
//! its `ScheduleHandle` is cancelled or dropped. The first tick runs right
//! away; each tick decides the delay before the next one through `NextTick`.
//!
//! The subscription manager only talks to this trait, so the same logic can
//! be driven by tokio timers in production or by a hand-cranked scheduler in
//! tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::markets::forex::CurrencyPair;

/// What a finished tick asks the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTick {
    /// Run again after the interval the schedule was started with.
    Scheduled,
    /// Run again after this delay instead.
    After(Duration),
    /// End the schedule.
    Stop,
}

/// Future returned by a tick callback.
pub type TickFuture = Pin<Box<dyn Future<Output = NextTick> + Send>>;

/// The callback a schedule invokes on every tick.
pub type Tick = Arc<dyn Fn() -> TickFuture + Send + Sync>;

/// Owner's handle on a running schedule. Dropping it cancels the schedule.
#[derive(Debug)]
pub struct ScheduleHandle {
    pair: CurrencyPair,
    token: CancellationToken,
}

impl ScheduleHandle {
    /// Wraps the token a scheduler watches for `pair`.
    pub fn new(pair: CurrencyPair, token: CancellationToken) -> Self {
        Self { pair, token }
    }

    /// Pair the schedule polls.
    pub fn pair(&self) -> &CurrencyPair {
        &self.pair
    }

    /// Stops the schedule. No tick starts after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Starts and stops repeating per-pair ticks.
pub trait Scheduler: Send + Sync {
    /// Runs `tick` now, then again according to each returned `NextTick`.
    fn start(&self, pair: &CurrencyPair, interval: Duration, tick: Tick) -> ScheduleHandle;

    /// Stops a schedule started by this scheduler.
    fn cancel(&self, handle: ScheduleHandle) {
        debug!(pair = %handle.pair(), "Cancelling schedule");
        handle.cancel();
    }
}

/// `Scheduler` backed by one tokio task per schedule.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    root: CancellationToken,
}

impl TokioScheduler {
    /// Creates a scheduler with its own root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler whose schedules all stop when `parent` is cancelled.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            root: parent.child_token(),
        }
    }

    /// Cancels every schedule started by this scheduler.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn start(&self, pair: &CurrencyPair, interval: Duration, tick: Tick) -> ScheduleHandle {
        let token = self.root.child_token();
        let handle = ScheduleHandle::new(pair.clone(), token.clone());

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(pair = %pair, "Cannot schedule polling outside a tokio runtime: {}", e);
                token.cancel();
                return handle;
            }
        };

        let label = pair.to_string();
        runtime.spawn(async move {
            let mut delay: Option<Duration> = None;
            loop {
                if let Some(d) = delay {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(d) => {}
                    }
                }

                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = tick() => next,
                };

                delay = match next {
                    NextTick::Scheduled => Some(interval),
                    NextTick::After(d) => Some(d),
                    NextTick::Stop => break,
                };
            }
            debug!(pair = %label, "Polling loop stopped");
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_tick(count: Arc<AtomicUsize>, next: NextTick) -> Tick {
        Arc::new(move || -> TickFuture {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                next
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_then_at_interval() {
        let pair: CurrencyPair = "USD/JPY".parse().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = TokioScheduler::new();
        let handle = scheduler.start(&pair, Duration::from_secs(5), counting_tick(count.clone(), NextTick::Scheduled));
        assert_eq!(handle.pair(), &pair);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.cancel(handle);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_schedule() {
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let _handle = TokioScheduler::new().start(&pair, Duration::from_secs(1), counting_tick(count.clone(), NextTick::Stop));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_every_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = TokioScheduler::new();
        let a = scheduler.start(&"USD/JPY".parse().unwrap(), Duration::from_secs(1), counting_tick(count.clone(), NextTick::Scheduled));
        let b = scheduler.start(&"EUR/USD".parse().unwrap(), Duration::from_secs(1), counting_tick(count.clone(), NextTick::Scheduled));

        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.shutdown();
        assert!(a.is_cancelled() && b.is_cancelled());

        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
