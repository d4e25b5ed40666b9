//! Periodic trigger for [`Bridge::run_cycle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::orchestrator::Bridge;
use crate::types::{RunState, SyncOptions};

pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;

/// Shortest period [`every`] will tick at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running scheduler. Dropping it leaves the scheduler running;
/// call [`SchedulerHandle::stop`] to end it.
pub struct SchedulerHandle {
    ticker: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop triggering new cycles. A cycle already in flight runs to the end.
    pub fn stop(self) {
        self.ticker.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.ticker.is_finished()
    }
}

/// Start automatic mode: one cycle now, then one per `interval_minutes`
/// (at least one).
pub fn automatic(bridge: Arc<Bridge>, interval_minutes: u64, options: SyncOptions) -> SchedulerHandle {
    let minutes = interval_minutes.max(1);
    bridge.info(format!("new process every {minutes} minutes"));
    every(bridge, Duration::from_secs(minutes * 60), options)
}

/// Trigger a cycle immediately and at each `period` tick. A tick that fires
/// while a cycle is still running is dropped, never queued. A zero `period`
/// is raised to one millisecond.
pub fn every(bridge: Arc<Bridge>, period: Duration, options: SyncOptions) -> SchedulerHandle {
    let period = period.max(MIN_PERIOD);
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        loop {
            interval.tick().await;
            if bridge.state() == RunState::Running {
                tracing::info!("previous cycle still running; tick skipped");
                continue;
            }
            let bridge = Arc::clone(&bridge);
            let options = options.clone();
            tokio::spawn(async move {
                bridge.run_cycle(&options).await;
            });
        }
    });
    SchedulerHandle { ticker }
}
