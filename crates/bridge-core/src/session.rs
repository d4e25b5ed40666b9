//! Collaborator contracts the orchestrator drives.
//!
//! An [`AccountSession`] talks to the cloud account; a [`PeripheralSession`]
//! talks to one physical sensor for the duration of one visitation. Both are
//! object-safe so a [`Bridge`](crate::Bridge) can be assembled from any
//! implementation, including in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::events::ProgressReporter;
use crate::snapshot::UserSnapshot;
use crate::types::{AccessToken, Credentials, SampleSync, SampleUpload};

#[async_trait]
pub trait AccountSession: Send + Sync {
    /// Authenticate and keep the token for the following calls.
    async fn login(&self, credentials: &Credentials) -> Result<AccessToken>;

    async fn get_profile(&self) -> Result<Value>;

    async fn get_garden(&self) -> Result<Value>;

    /// Push one batch of samples read from a device.
    async fn upload_samples(&self, upload: &SampleUpload) -> Result<()>;
}

/// One connection to one device.
///
/// Calls arrive in the order `find_and_connect`, then zero or more sync
/// steps, then `disconnect`. `disconnect` is called whenever
/// `find_and_connect` succeeded, whatever the steps returned.
#[async_trait]
pub trait PeripheralSession: Send {
    async fn find_and_connect(&mut self, progress: &ProgressReporter) -> Result<()>;

    async fn sync_samples(&mut self, progress: &ProgressReporter) -> Result<SampleSync>;

    async fn disconnect(&mut self, progress: &ProgressReporter) -> Result<()>;
}

/// Everything a peripheral session is scoped to.
#[derive(Clone)]
pub struct DeviceContext {
    pub device_id: String,
    pub snapshot: Arc<UserSnapshot>,
    pub account: Arc<dyn AccountSession>,
}

/// Builds a fresh [`PeripheralSession`] for each visitation task.
pub trait PeripheralFactory: Send + Sync {
    fn open(&self, ctx: DeviceContext) -> Box<dyn PeripheralSession>;
}

impl<F> PeripheralFactory for F
where
    F: Fn(DeviceContext) -> Box<dyn PeripheralSession> + Send + Sync,
{
    fn open(&self, ctx: DeviceContext) -> Box<dyn PeripheralSession> {
        self(ctx)
    }
}
