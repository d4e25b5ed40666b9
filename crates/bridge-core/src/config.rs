use crate::error::{BridgeError, Result};
use crate::protocol::SyncStep;
use crate::scheduler::DEFAULT_INTERVAL_MINUTES;
use crate::types::{Credentials, SyncOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

fn default_base_url() -> String {
    "https://apiflowerpower.parrot.com".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AccountConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    /// Usually left out of the file and supplied through the environment.
    #[serde(default)]
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub priority: Vec<String>,
    /// Per device call; `0` waits indefinitely.
    #[serde(default = "default_device_timeout")]
    pub device_timeout_secs: u64,
    #[serde(default = "default_steps")]
    pub steps: Vec<SyncStep>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_device_timeout() -> u64 {
    300
}

fn default_steps() -> Vec<SyncStep> {
    vec![SyncStep::Samples]
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval(),
            priority: Vec::new(),
            device_timeout_secs: default_device_timeout(),
            steps: default_steps(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventsConfig / PeripheralConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeripheralConfig {
    /// argv of the driver helper; the device id is appended per visit.
    #[serde(default)]
    pub command: Vec<String>,
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub peripheral: PeripheralConfig,
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BridgeError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: BridgeConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Login credentials; `password` overrides the one in the file.
    pub fn credentials(&self, password: Option<&str>) -> Result<Credentials> {
        let password = password
            .map(str::to_owned)
            .or_else(|| self.account.password.clone())
            .ok_or_else(|| BridgeError::Config("no account password configured".into()))?;
        if self.account.username.is_empty() {
            return Err(BridgeError::Config("account.username is empty".into()));
        }
        Ok(Credentials {
            username: self.account.username.clone(),
            password,
            client_id: self.api.client_id.clone(),
            client_secret: self.api.client_secret.clone(),
        })
    }

    /// Cycle options from the `sync` section, with extra priority ids placed
    /// before the configured ones.
    pub fn sync_options(&self, extra_priority: &[String]) -> SyncOptions {
        let mut priority = extra_priority.to_vec();
        priority.extend(self.sync.priority.iter().cloned());
        SyncOptions {
            priority,
            device_timeout: match self.sync.device_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            steps: self.sync.steps.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.api.client_id.is_empty() || self.api.client_secret.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api.client_id and api.client_secret are required".into(),
            });
        }

        if self.account.username.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "account.username is empty".into(),
            });
        }

        if self.peripheral.command.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "peripheral.command is empty: no device can be reached".into(),
            });
        }

        if self.sync.interval_minutes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "sync.interval_minutes is 0; using 1 minute".into(),
            });
        }

        if self.sync.device_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "sync.device_timeout_secs is 0: a stalled device blocks the whole cycle"
                    .into(),
            });
        }

        if self.sync.steps.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "sync.steps is empty: devices are connected but nothing is synced".into(),
            });
        }

        warnings
    }
}
