//! Per-device sync protocol.
//!
//! A visitation runs an ordered list of [`SyncStep`]s between connect and
//! disconnect. The first failing step ends the list for that device; steps
//! that already ran keep their effects.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::events::ProgressReporter;
use crate::session::PeripheralSession;
use crate::types::SyncSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    /// Read buffered samples off the device and upload them.
    Samples,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Samples => "samples",
        }
    }
}

/// Run `steps` in order against a connected session.
///
/// Returns what was achieved, plus the error that stopped the list early, if
/// any.
pub async fn run_steps(
    session: &mut dyn PeripheralSession,
    steps: &[SyncStep],
    progress: &ProgressReporter,
    timeout: Option<Duration>,
) -> (SyncSummary, Option<BridgeError>) {
    let mut summary = SyncSummary::default();

    for step in steps {
        tracing::debug!(device = progress.device_id(), step = step.as_str(), "running sync step");
        let outcome = match step {
            SyncStep::Samples => bounded(
                progress.device_id(),
                step.as_str(),
                timeout,
                session.sync_samples(progress),
            )
            .await
            .map(|sync| summary.samples_uploaded += sync.samples),
        };

        match outcome {
            Ok(()) => summary.completed.push(*step),
            Err(e) => {
                let e = match e {
                    e @ (BridgeError::Sync { .. } | BridgeError::Timeout { .. }) => e,
                    other => BridgeError::Sync {
                        device: progress.device_id().to_string(),
                        reason: other.to_string(),
                    },
                };
                return (summary, Some(e));
            }
        }
    }

    (summary, None)
}

/// Await `fut`, giving up after `limit` when one is set.
pub(crate) async fn bounded<T>(
    device: &str,
    stage: &str,
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(r) => r,
            Err(_) => Err(BridgeError::Timeout {
                device: device.to_string(),
                stage: stage.to_string(),
                secs: limit.as_secs(),
            }),
        },
    }
}
