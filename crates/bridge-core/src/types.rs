use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::protocol::SyncStep;

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Run-state of a [`Bridge`](crate::Bridge).
///
/// Transitions: `Idle → Running → Idle`. A cycle only starts from `Idle`; a
/// request made while `Running` is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Running => f.write_str("running"),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Token returned by a successful login.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// A batch of samples read from one device, ready to be pushed upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleUpload {
    pub device_id: String,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Sync results
// ---------------------------------------------------------------------------

/// Result of the sample-sync step on one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSync {
    pub samples: u64,
}

/// What a device visitation achieved before disconnect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Steps that ran to completion, in order.
    pub completed: Vec<SyncStep>,
    pub samples_uploaded: u64,
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceStatus {
    /// The session reported progress through a stage (searching, syncing, ...).
    InProgress { stage: String },
    /// Terminal: the device is released and the queue moves on.
    Disconnected,
}

impl DeviceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceStatus::Disconnected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePayload {
    pub device_id: String,
    pub status: DeviceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl DevicePayload {
    pub fn progress(device_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            status: DeviceStatus::InProgress {
                stage: stage.into(),
            },
            summary: None,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn disconnected(
        device_id: impl Into<String>,
        summary: Option<SyncSummary>,
        error: Option<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            status: DeviceStatus::Disconnected,
            summary,
            error,
            at: Utc::now(),
        }
    }
}

/// Everything a [`Bridge`](crate::Bridge) broadcasts to its listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Info { message: String, at: DateTime<Utc> },
    Error { message: String, at: DateTime<Utc> },
    DeviceProcessed(DevicePayload),
    LoginSucceeded { token: String, at: DateTime<Utc> },
}

impl LifecycleEvent {
    pub fn info(message: impl Into<String>) -> Self {
        LifecycleEvent::Info {
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        LifecycleEvent::Error {
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            LifecycleEvent::Info { at, .. }
            | LifecycleEvent::Error { at, .. }
            | LifecycleEvent::LoginSucceeded { at, .. } => *at,
            LifecycleEvent::DeviceProcessed(p) => p.at,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle input / output
// ---------------------------------------------------------------------------

/// Options shared by a manual cycle and the scheduler.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Device-native identifiers visited before the account's sensors.
    pub priority: Vec<String>,
    /// Upper bound for each connect / step / disconnect call. `None` waits forever.
    pub device_timeout: Option<Duration>,
    /// Per-device protocol, run in order after connect.
    pub steps: Vec<SyncStep>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            priority: Vec::new(),
            device_timeout: None,
            steps: vec![SyncStep::Samples],
        }
    }
}

impl SyncOptions {
    pub fn with_priority(priority: Vec<String>) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Tally of one drained visitation queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Device ids in the order they were visited.
    pub visited: Vec<String>,
    /// Device ids whose visitation ended with an error.
    pub failed: Vec<String>,
    pub samples_uploaded: u64,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// A cycle was already running; nothing happened.
    Skipped,
    /// The snapshot could not be built; no device was touched.
    SnapshotFailed(crate::BridgeError),
    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(r) => Some(r),
            _ => None,
        }
    }
}
