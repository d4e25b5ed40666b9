use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("login failed: {0}")]
    Auth(String),

    #[error("cloud request {endpoint} failed with status {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("cloud unreachable: {0}")]
    Transport(String),

    #[error("snapshot fetch failed: {0}")]
    Snapshot(#[source] Box<BridgeError>),

    #[error("cannot compose user snapshot: {0}")]
    Composition(String),

    #[error("cannot connect to {device}: {reason}")]
    Connect { device: String, reason: String },

    #[error("sync failed on {device}: {reason}")]
    Sync { device: String, reason: String },

    #[error("{device} did not answer within {secs}s during {stage}")]
    Timeout {
        device: String,
        stage: String,
        secs: u64,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Device-scoped failures are contained to the device that raised them;
    /// the cycle moves on to the next task.
    pub fn is_device_scoped(&self) -> bool {
        matches!(
            self,
            BridgeError::Connect { .. } | BridgeError::Sync { .. } | BridgeError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_error_names_the_cause() {
        let err = BridgeError::Snapshot(Box::new(BridgeError::Api {
            endpoint: "garden".into(),
            status: 503,
            message: "maintenance".into(),
        }));
        let msg = err.to_string();
        assert!(msg.starts_with("snapshot fetch failed"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn only_device_errors_are_scoped() {
        assert!(BridgeError::Connect {
            device: "a".into(),
            reason: "out of range".into()
        }
        .is_device_scoped());
        assert!(BridgeError::Timeout {
            device: "a".into(),
            stage: "connect".into(),
            secs: 3
        }
        .is_device_scoped());
        assert!(!BridgeError::Auth("bad password".into()).is_device_scoped());
        assert!(!BridgeError::Composition("no sensors".into()).is_device_scoped());
    }
}
