//! `bridge-core` — device-sync orchestrator for sensor peripherals.
//!
//! A [`Bridge`] logs into a cloud account, builds a [`UserSnapshot`] of the
//! account's sensors, and visits every sensor once per cycle to push its
//! buffered samples upstream. Visits are strictly sequential; a device that
//! cannot be reached or fails mid-sync is skipped and the cycle goes on.
//!
//! # Architecture
//!
//! ```text
//! scheduler::automatic ──tick──▶ Bridge::run_cycle
//!                                   │
//!                                   ├─▶ AccountSession   (profile ∥ garden)
//!                                   ├─▶ UserSnapshot::compose
//!                                   ├─▶ VisitationQueue::build
//!                                   └─▶ PeripheralSession per device
//!                                          connect → protocol::run_steps → disconnect
//!
//! every stage ──▶ EventBus ──▶ Subscription (any number of listeners)
//! ```
//!
//! The cloud client and the peripheral driver are supplied by the caller
//! through the [`AccountSession`] and [`PeripheralFactory`] traits.

pub mod config;
pub mod error;
pub mod events;
pub mod ident;
pub mod io;
pub mod orchestrator;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod types;


pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use events::{EventBus, ProgressReporter, Subscription};
pub use orchestrator::{Bridge, VisitationQueue, VisitationTask};
pub use protocol::SyncStep;
pub use scheduler::{automatic, SchedulerHandle};
pub use session::{AccountSession, DeviceContext, PeripheralFactory, PeripheralSession};
pub use snapshot::{SensorRecord, UserSnapshot};
pub use types::{
    AccessToken, Credentials, CycleOutcome, CycleReport, DevicePayload, DeviceStatus,
    LifecycleEvent, RunState, SampleSync, SampleUpload, SyncOptions, SyncSummary,
};
