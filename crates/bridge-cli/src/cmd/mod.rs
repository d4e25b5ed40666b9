pub mod check;
pub mod init;
pub mod login;
pub mod run;
pub mod sensors;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bridge_cloud::CloudClient;
use bridge_core::{Bridge, BridgeConfig, EventBus, Subscription};
use tokio::task::JoinHandle;

use crate::output::format_event;
use crate::peripheral::CommandPeripheralFactory;

/// Options every command receives from the global flags.
pub struct Globals<'a> {
    pub config: &'a Path,
    pub password: Option<&'a str>,
    pub json: bool,
}

pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    BridgeConfig::load(path).context("failed to load config")
}

/// Assemble a bridge from the config: HTTP account session plus the
/// subprocess peripheral driver.
pub fn build_bridge(config: &BridgeConfig) -> Arc<Bridge> {
    let account = Arc::new(CloudClient::new(config.api.base_url.clone()));
    let peripherals = Arc::new(CommandPeripheralFactory::new(
        config.peripheral.command.clone(),
    ));
    Arc::new(Bridge::with_events(
        account,
        peripherals,
        EventBus::new(config.events.capacity),
    ))
}

pub async fn login(
    bridge: &Bridge,
    config: &BridgeConfig,
    password: Option<&str>,
) -> anyhow::Result<bridge_core::AccessToken> {
    let credentials = config.credentials(password)?;
    bridge
        .login(&credentials)
        .await
        .with_context(|| format!("login as {} failed", credentials.username))
}

/// Print every event until the bus closes.
pub fn spawn_printer(mut events: Subscription, json: bool) -> JoinHandle<()> {
    use futures::StreamExt;

    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            println!("{}", format_event(&event, json));
        }
    })
}
