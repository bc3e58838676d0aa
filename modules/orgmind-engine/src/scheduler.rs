//! Timer-driven batch trigger.
//!
//! A ticker task fires every `batch_interval` and hands each tick to
//! `Engine::run_batch` on its own task. At most one batch runs at a time:
//! a tick that finds the engine's batch lock taken is dropped rather than
//! queued.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use orgmind_common::{CapabilityError, EngineError};

use crate::engine::Engine;

/// What one call to `Engine::run_batch` did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Another batch was still in flight.
    Dropped,
    /// No run in progress.
    Idle,
    /// Batch applied to the store.
    Processed { batch: usize, records: usize },
    /// A stage failed. Records are consumed, the run continues.
    Failed { batch: usize, error: CapabilityError },
    /// The run was stopped or restarted while the batch was in flight.
    Discarded { batch: usize },
    /// The queue is drained and the run is now `completed`.
    Completed,
    /// Run-fatal error. The run is now in the `error` phase.
    Halted(EngineError),
}

impl TickOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TickOutcome::Completed | TickOutcome::Halted(_))
    }
}

/// First tick fires one full `period` after spawning. Exits once the run leaves `running`.
pub(crate) fn spawn_ticker(weak: Weak<Engine>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticks.tick().await;
            let Some(engine) = weak.upgrade() else {
                break;
            };
            if !engine.status().await.is_running() {
                break;
            }
            tokio::spawn(async move {
                let outcome = engine.run_batch().await;
                debug!(?outcome, "Tick handled");
            });
        }
        debug!("Ticker stopped");
    })
}
