#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bridge(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flower-bridge").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("FLOWER_BRIDGE_CONFIG")
        .env_remove("FLOWER_BRIDGE_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, base_url: &str, driver: &str) {
    let config = format!(
        r#"api:
  base_url: "{base_url}"
  client_id: cid
  client_secret: csecret
account:
  username: me@example.com
  password: hunter2
sync:
  device_timeout_secs: 10
peripheral:
  command: ["sh", "-c", {driver:?}, "driver"]
"#
    );
    std::fs::write(dir.path().join("flower-bridge.yaml"), config).unwrap();
}

fn mock_account(server: &mut mockito::ServerGuard) {
    server
        .mock("POST", "/user/v1/authenticate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"abc","expires_in":7200}"#)
        .create();
    server
        .mock("GET", "/user/v4/profile")
        .match_header("authorization", "Bearer abc")
        .with_status(200)
        .with_body(r#"{"user_profile":{"email":"me@example.com"}}"#)
        .create();
    server
        .mock("GET", "/sensor_data/v4/garden_locations_status")
        .match_header("authorization", "Bearer abc")
        .with_status(200)
        .with_body(r#"{"sensors":[{"sensor_serial":"A0143D000008B4C7","nickname":"fern"}]}"#)
        .create();
}

// ---------------------------------------------------------------------------
// flower-bridge --help / check
// ---------------------------------------------------------------------------

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    bridge(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sensors"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("auto"));
}

#[test]
fn missing_config_fails_with_path() {
    let dir = TempDir::new().unwrap();
    bridge(&dir)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("flower-bridge.yaml"));
}

#[test]
fn check_accepts_complete_config() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "http://127.0.0.1:9", "true");
    bridge(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn check_rejects_missing_driver() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flower-bridge.yaml"),
        "api:\n  client_id: cid\n  client_secret: s\naccount:\n  username: me\n",
    )
    .unwrap();
    bridge(&dir)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("peripheral.command is empty"));
}

// ---------------------------------------------------------------------------
// flower-bridge sensors / run
// ---------------------------------------------------------------------------

#[test]
fn sensors_json_lists_peripheral_ids() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    mock_account(&mut server);
    write_config(&dir, &server.url(), "true");

    let output = bridge(&dir).args(["sensors", "--json"]).output().unwrap();
    assert!(output.status.success(), "{output:?}");
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["serial"], "A0143D000008B4C7");
    assert_eq!(rows[0]["peripheral_id"], "a0143d08b4c7");
    assert_eq!(rows[0]["nickname"], "fern");
}

#[test]
fn rejected_login_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/user/v1/authenticate")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create();
    write_config(&dir, &server.url(), "true");

    bridge(&dir)
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("login as me@example.com failed"));
}

#[test]
fn run_visits_priority_then_sensors() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    mock_account(&mut server);
    let upload = server
        .mock("PUT", "/sensor_data/v8/sample")
        .with_status(200)
        .with_body("{}")
        .create();

    // Only the account's sensor answers; the priority device is out of range.
    let driver = r#"
        if [ "$1" != "a0143d08b4c7" ]; then
            echo '{"type":"error","message":"not in range"}'
            exit 0
        fi
        echo '{"type":"connected"}'
        read cmd
        echo '{"type":"samples","payload":{"session_histories":[]}}'
        echo '{"type":"synced","samples":3}'
        read cmd
    "#;
    write_config(&dir, &server.url(), driver);

    bridge(&dir)
        .args(["run", "--priority", "ffffffffffff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new scan for 1 sensors"))
        .stdout(predicate::str::contains("device ffffffffffff  disconnected (cannot connect to ffffffffffff: not in range)"))
        .stdout(predicate::str::contains("device a0143d08b4c7  disconnected (3 samples)"))
        .stdout(predicate::str::contains("Visited 2 device(s), 1 failed, 3 sample(s) uploaded."));
    upload.assert();
}

// ---------------------------------------------------------------------------
// flower-bridge init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_loadable_config() {
    let dir = TempDir::new().unwrap();
    bridge(&dir)
        .args(["init", "--username", "me@example.com"])
        .assert()
        .success();

    let written = std::fs::read_to_string(dir.path().join("flower-bridge.yaml")).unwrap();
    assert!(written.contains("me@example.com"));
    assert!(written.contains("interval_minutes: 15"));

    // The starter config lacks client credentials and a driver.
    bridge(&dir)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("api.client_id"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    bridge(&dir).arg("init").assert().success();
    bridge(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    bridge(&dir).args(["init", "--force"]).assert().success();
}
