//! # Lifecycle Controller
//!
//! Maps application phase changes onto the subscription manager's global
//! pause. Going inactive or to the background pauses everything; coming back
//! to the foreground resumes only if the manager is actually paused.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SubscriptionManager;
use crate::markets::forex::CurrencyPair;

/// Application phases reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppPhase {
    /// In the foreground.
    #[default]
    Active,
    /// Visible but not interactive.
    Inactive,
    /// Not visible.
    Background,
}

/// Drives `pause_all`/`resume_all` from phase transitions.
pub struct LifecycleController {
    manager: SubscriptionManager,
    phase: Mutex<AppPhase>,
}

impl LifecycleController {
    /// Creates a controller that starts in `AppPhase::Active`.
    pub fn new(manager: SubscriptionManager) -> Self {
        Self {
            manager,
            phase: Mutex::new(AppPhase::Active),
        }
    }

    /// Last phase handled.
    pub fn current_phase(&self) -> AppPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one phase report.
    pub fn handle_phase(&self, next: AppPhase) {
        let previous = {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *phase, next)
        };
        if previous != next {
            info!("Transitioning phase: {:?} -> {:?}", previous, next);
        }

        match next {
            AppPhase::Inactive | AppPhase::Background => self.manager.pause_all(),
            AppPhase::Active => {
                if self.manager.is_paused() {
                    self.manager.resume_all();
                }
            }
        }
    }

    /// Manual pause for one pair, independent of the phase.
    pub fn pause_pair(&self, pair: &CurrencyPair) {
        self.manager.pause(pair);
    }

    /// Lifts a manual pause for one pair.
    pub fn resume_pair(&self, pair: &CurrencyPair) {
        self.manager.resume(pair);
    }

    /// Follows `phases` until `shutdown` fires or the sender goes away.
    pub async fn run(&self, mut phases: watch::Receiver<AppPhase>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = phases.changed() => {
                    if changed.is_err() {
                        debug!("Phase sender dropped");
                        break;
                    }
                    let phase = *phases.borrow_and_update();
                    self.handle_phase(phase);
                }
            }
        }
        debug!("Lifecycle controller stopped");
    }
}
