//! The device-sync orchestrator.
//!
//! A [`Bridge`] owns the run-state, builds one visitation queue per cycle
//! and drains it with a single worker:
//!
//! ```text
//! run_cycle
//!   │  Idle → Running (atomic; dropped if already Running)
//!   ▼
//! fetch_snapshot ── profile ┐
//!                └─ garden  ┴─ join → UserSnapshot::compose
//!   ▼
//! build_queue    priority ids ++ translated sensor serials
//!   ▼
//! visit(task)*   connect → steps → disconnect, one device at a time
//!   ▼
//! Running → Idle
//! ```

use std::sync::{Arc, Mutex};

use tracing::Instrument;
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::events::{EventBus, ProgressReporter, Subscription};
use crate::protocol::{self, bounded};
use crate::session::{AccountSession, DeviceContext, PeripheralFactory};
use crate::snapshot::UserSnapshot;
use crate::types::{
    AccessToken, CycleOutcome, CycleReport, Credentials, DevicePayload, LifecycleEvent, RunState,
    SyncOptions, SyncSummary,
};

pub const ALL_PROCESSED: &str = "all devices processed";

// ---------------------------------------------------------------------------
// Visitation queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitationTask {
    pub device_id: String,
}

/// Ordered, immutable list of devices to visit in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitationQueue {
    tasks: Vec<VisitationTask>,
}

impl VisitationQueue {
    /// Priority ids first, in the order given, then every sensor of the
    /// snapshot translated to its peripheral id. Duplicates are kept.
    pub fn build(priority: &[String], snapshot: &UserSnapshot) -> Self {
        let tasks = priority
            .iter()
            .cloned()
            .chain(snapshot.peripheral_ids())
            .map(|device_id| VisitationTask { device_id })
            .collect();
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.device_id.as_str())
    }
}

impl IntoIterator for VisitationQueue {
    type Item = VisitationTask;
    type IntoIter = std::vec::IntoIter<VisitationTask>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

pub struct Bridge {
    account: Arc<dyn AccountSession>,
    peripherals: Arc<dyn PeripheralFactory>,
    events: EventBus,
    state: Mutex<RunState>,
}

/// Holds the bridge in `Running`; puts it back to `Idle` when dropped, so a
/// cycle that errors, panics or is cancelled never leaves the state stuck.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = RunState::Idle;
    }
}

impl Bridge {
    pub fn new(account: Arc<dyn AccountSession>, peripherals: Arc<dyn PeripheralFactory>) -> Self {
        Self::with_events(account, peripherals, EventBus::default())
    }

    pub fn with_events(
        account: Arc<dyn AccountSession>,
        peripherals: Arc<dyn PeripheralFactory>,
        events: EventBus,
    ) -> Self {
        Self {
            account,
            peripherals,
            events,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn account(&self) -> &Arc<dyn AccountSession> {
        &self.account
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.events.emit(LifecycleEvent::info(message));
    }

    fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.events.emit(LifecycleEvent::error(message));
    }

    /// Authenticate against the account. Does not touch the run-state.
    pub async fn login(&self, credentials: &Credentials) -> Result<AccessToken> {
        let token = self.account.login(credentials).await?;
        self.events.emit(LifecycleEvent::LoginSucceeded {
            token: token.access_token.clone(),
            at: chrono::Utc::now(),
        });
        Ok(token)
    }

    /// Fetch profile and garden concurrently and merge them.
    ///
    /// Both requests are awaited; if both fail the garden error is reported.
    pub async fn fetch_snapshot(&self) -> Result<UserSnapshot> {
        let (profile, garden) = tokio::join!(self.account.get_profile(), self.account.get_garden());
        let (profile, garden) = match (profile, garden) {
            (Ok(p), Ok(g)) => (p, g),
            (_, Err(e)) | (Err(e), _) => return Err(BridgeError::Snapshot(Box::new(e))),
        };
        UserSnapshot::compose(Some(profile), Some(garden))
            .map_err(|e| BridgeError::Snapshot(Box::new(e)))
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state == RunState::Running {
            return None;
        }
        *state = RunState::Running;
        Some(RunGuard { state: &self.state })
    }

    /// Run one full cycle, or do nothing if a cycle is already running.
    pub async fn run_cycle(&self, options: &SyncOptions) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("cycle requested while running; ignored");
            return CycleOutcome::Skipped;
        };

        let span = tracing::info_span!("cycle", id = %Uuid::new_v4());
        self.cycle(options).instrument(span).await
    }

    async fn cycle(&self, options: &SyncOptions) -> CycleOutcome {
        let snapshot = match self.fetch_snapshot().await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                self.error(e.to_string());
                return CycleOutcome::SnapshotFailed(e);
            }
        };

        self.info(format!("new scan for {} sensors", snapshot.sensors.len()));
        let queue = VisitationQueue::build(&options.priority, &snapshot);
        tracing::debug!(devices = ?queue.device_ids().collect::<Vec<_>>(), "visitation queue");

        let mut report = CycleReport::default();
        for task in queue {
            let (summary, err) = self.visit(&task, &snapshot, options).await;
            report.samples_uploaded += summary.as_ref().map_or(0, |s| s.samples_uploaded);
            if err.is_some() {
                report.failed.push(task.device_id.clone());
            }
            report.visited.push(task.device_id);
        }

        self.info(ALL_PROCESSED);
        CycleOutcome::Completed(report)
    }

    /// connect → steps → disconnect for one device. Emits exactly one
    /// terminal `DeviceProcessed` event.
    async fn visit(
        &self,
        task: &VisitationTask,
        snapshot: &Arc<UserSnapshot>,
        options: &SyncOptions,
    ) -> (Option<SyncSummary>, Option<BridgeError>) {
        let device = task.device_id.as_str();
        let progress = ProgressReporter::new(device, self.events.clone());
        let mut session = self.peripherals.open(DeviceContext {
            device_id: device.to_string(),
            snapshot: Arc::clone(snapshot),
            account: Arc::clone(&self.account),
        });

        let connected = bounded(
            device,
            "connect",
            options.device_timeout,
            session.find_and_connect(&progress),
        )
        .await
        .map_err(|e| match e {
            e @ (BridgeError::Connect { .. } | BridgeError::Timeout { .. }) => e,
            other => BridgeError::Connect {
                device: device.to_string(),
                reason: other.to_string(),
            },
        });

        if let Err(e) = connected {
            tracing::warn!(device, error = %e, "skipping unreachable device");
            self.finish(device, None, Some(&e));
            return (None, Some(e));
        }

        let (summary, mut err) = protocol::run_steps(
            session.as_mut(),
            &options.steps,
            &progress,
            options.device_timeout,
        )
        .await;

        if let Err(e) = bounded(
            device,
            "disconnect",
            options.device_timeout,
            session.disconnect(&progress),
        )
        .await
        {
            tracing::warn!(device, error = %e, "disconnect failed");
            err.get_or_insert(e);
        }

        if let Some(e) = &err {
            tracing::warn!(device, error = %e, "device sync failed");
        } else {
            tracing::info!(device, samples = summary.samples_uploaded, "device synced");
        }
        self.finish(device, Some(summary.clone()), err.as_ref());
        (Some(summary), err)
    }

    fn finish(&self, device: &str, summary: Option<SyncSummary>, err: Option<&BridgeError>) {
        self.events
            .emit(LifecycleEvent::DeviceProcessed(DevicePayload::disconnected(
                device,
                summary,
                err.map(ToString::to_string),
            )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(serials: &[&str]) -> UserSnapshot {
        let sensors: Vec<_> = serials
            .iter()
            .map(|s| json!({ "sensor_serial": s }))
            .collect();
        UserSnapshot::compose(Some(json!({})), Some(json!({ "sensors": sensors }))).unwrap()
    }

    #[test]
    fn queue_is_priority_then_sensors() {
        let snap = snapshot(&["SN1", "SN2"]);
        let q = VisitationQueue::build(&["peripheral-X".to_string()], &snap);
        let ids: Vec<_> = q.device_ids().collect();
        assert_eq!(ids, vec!["peripheral-X", "sn1", "sn2"]);
    }

    #[test]
    fn queue_keeps_duplicates_and_does_not_sort() {
        let snap = snapshot(&["ZZ", "A0143D000008B4C7", "AA"]);
        let priority = vec!["a0143d08b4c7".to_string(), "b".into(), "b".into()];
        let q = VisitationQueue::build(&priority, &snap);
        let ids: Vec<_> = q.device_ids().collect();
        assert_eq!(
            ids,
            vec!["a0143d08b4c7", "b", "b", "zz", "a0143d08b4c7", "aa"]
        );
    }

    #[test]
    fn empty_inputs_give_empty_queue() {
        let q = VisitationQueue::build(&[], &UserSnapshot::default());
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }
}
