use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{
    BridgeError, DeviceContext, PeripheralFactory, PeripheralSession, ProgressReporter, Result,
    SampleSync, SampleUpload,
};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

// ─── Driver protocol ──────────────────────────────────────────────────────

/// One JSON line written by the driver helper on stdout.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverMessage {
    Progress { stage: String },
    Connected,
    Samples { payload: serde_json::Value },
    Synced { samples: u64 },
    Error { message: String },
}

const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

// ─── CommandPeripheralFactory ─────────────────────────────────────────────

/// Opens a [`CommandPeripheral`] per device by spawning the configured
/// driver helper with the device id appended to its argv.
pub struct CommandPeripheralFactory {
    argv: Vec<String>,
}

impl CommandPeripheralFactory {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl PeripheralFactory for CommandPeripheralFactory {
    fn open(&self, ctx: DeviceContext) -> Box<dyn PeripheralSession> {
        Box::new(CommandPeripheral {
            argv: self.argv.clone(),
            ctx,
            driver: None,
        })
    }
}

// ─── CommandPeripheral ────────────────────────────────────────────────────

/// A device session backed by a driver subprocess speaking JSON lines.
///
/// The helper reports on stdout (`progress`, `connected`, `samples`,
/// `synced`, `error`) and takes `{"command":"sync"}` and
/// `{"command":"disconnect"}` on stdin. Sample batches are forwarded to the
/// account session as they arrive.
pub struct CommandPeripheral {
    argv: Vec<String>,
    ctx: DeviceContext,
    driver: Option<Driver>,
}

struct Driver {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stdin: Option<ChildStdin>,
    /// Stderr output collected by a background reader task.
    stderr_buf: Arc<Mutex<String>>,
}

impl Driver {
    fn spawn(argv: &[String], ctx: &DeviceContext) -> Result<Self> {
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| BridgeError::Config("peripheral.command is empty".into()))?;

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .arg(&ctx.device_id)
            .env("FLOWER_BRIDGE_DEVICE", &ctx.device_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(sensor) = ctx.snapshot.sensor_for_peripheral(&ctx.device_id) {
            cmd.env("FLOWER_BRIDGE_SENSOR", serde_json::to_string(sensor)?);
        }

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Config("driver stdout not captured".into()))?;
        let stdin = child.stdin.take();

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stdin,
            stderr_buf,
        })
    }

    async fn send(&mut self, command: &str) -> std::io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "driver stdin closed",
            ));
        };
        let mut line = serde_json::json!({ "command": command }).to_string();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    /// Next recognised message; `Ok(None)` on EOF. Blank lines and unknown
    /// message types are skipped.
    async fn next_message(&mut self) -> std::result::Result<Option<DriverMessage>, String> {
        loop {
            let line = match self.lines.next_line().await {
                Err(e) => return Err(e.to_string()),
                Ok(None) => return Ok(None),
                Ok(Some(line)) => line,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<DriverMessage>(trimmed) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    if is_unknown_message_type(trimmed) {
                        tracing::debug!(line = trimmed, "ignoring driver message");
                        continue;
                    }
                    return Err(format!("unreadable driver output {trimmed:?}: {e}"));
                }
            }
        }
    }

    /// Explain why the driver stopped talking.
    async fn exit_reason(&mut self) -> String {
        let status = match tokio::time::timeout(DISCONNECT_GRACE, self.child.wait()).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return e.to_string(),
            Err(_) => return "driver closed stdout but kept running".into(),
        };
        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();
        let mut reason = match status.code() {
            Some(code) => format!("driver exited with code {code}"),
            None => "driver terminated by signal".to_string(),
        };
        if !stderr.is_empty() {
            reason.push_str(&format!("\nstderr: {stderr}"));
        }
        reason
    }

    async fn shutdown(&mut self) {
        let _ = self.send("disconnect").await;
        self.stdin.take();
        if tokio::time::timeout(DISCONNECT_GRACE, self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
        }
    }
}

/// Valid JSON with a `type` we don't know is skipped rather than failing.
fn is_unknown_message_type(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .map(|v| v.get("type").is_some())
        .unwrap_or(false)
}

impl CommandPeripheral {
    fn connect_error(&self, reason: impl Into<String>) -> BridgeError {
        BridgeError::Connect {
            device: self.ctx.device_id.clone(),
            reason: reason.into(),
        }
    }

    fn sync_error(&self, reason: impl Into<String>) -> BridgeError {
        BridgeError::Sync {
            device: self.ctx.device_id.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PeripheralSession for CommandPeripheral {
    async fn find_and_connect(&mut self, progress: &ProgressReporter) -> Result<()> {
        progress.stage("searching");
        let mut driver =
            Driver::spawn(&self.argv, &self.ctx).map_err(|e| self.connect_error(e.to_string()))?;

        loop {
            match driver.next_message().await {
                Ok(Some(DriverMessage::Connected)) => {
                    progress.stage("connected");
                    self.driver = Some(driver);
                    return Ok(());
                }
                Ok(Some(DriverMessage::Progress { stage })) => progress.stage(stage),
                Ok(Some(DriverMessage::Error { message })) => {
                    driver.shutdown().await;
                    return Err(self.connect_error(message));
                }
                Ok(Some(other)) => {
                    tracing::debug!(?other, "unexpected driver message before connect");
                }
                Ok(None) => {
                    let reason = driver.exit_reason().await;
                    return Err(self.connect_error(reason));
                }
                Err(e) => {
                    driver.shutdown().await;
                    return Err(self.connect_error(e));
                }
            }
        }
    }

    async fn sync_samples(&mut self, progress: &ProgressReporter) -> Result<SampleSync> {
        let device_id = self.ctx.device_id.clone();
        let account = Arc::clone(&self.ctx.account);
        let Some(driver) = self.driver.as_mut() else {
            return Err(BridgeError::Sync {
                device: device_id,
                reason: "not connected".into(),
            });
        };

        driver.send("sync").await.map_err(|e| BridgeError::Sync {
            device: device_id.clone(),
            reason: e.to_string(),
        })?;
        progress.stage("syncing");

        let outcome = loop {
            match driver.next_message().await {
                Ok(Some(DriverMessage::Samples { payload })) => {
                    let upload = SampleUpload {
                        device_id: device_id.clone(),
                        payload,
                    };
                    if let Err(e) = account.upload_samples(&upload).await {
                        break Err(format!("upload failed: {e}"));
                    }
                    progress.stage("uploaded");
                }
                Ok(Some(DriverMessage::Synced { samples })) => break Ok(SampleSync { samples }),
                Ok(Some(DriverMessage::Progress { stage })) => progress.stage(stage),
                Ok(Some(DriverMessage::Error { message })) => break Err(message),
                Ok(Some(DriverMessage::Connected)) => {}
                Ok(None) => break Err(driver.exit_reason().await),
                Err(e) => break Err(e),
            }
        };
        outcome.map_err(|reason| self.sync_error(reason))
    }

    async fn disconnect(&mut self, progress: &ProgressReporter) -> Result<()> {
        if let Some(mut driver) = self.driver.take() {
            driver.shutdown().await;
        }
        progress.stage("released");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
