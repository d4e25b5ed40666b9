use super::Globals;
use crate::output::{print_json, print_table};
use anyhow::Context;

pub fn run(globals: &Globals<'_>) -> anyhow::Result<()> {
    let config = super::load_config(globals.config)?;
    let bridge = super::build_bridge(&config);

    let rt = tokio::runtime::Runtime::new()?;
    let snapshot: bridge_core::UserSnapshot = rt.block_on(async {
        super::login(&bridge, &config, globals.password).await?;
        bridge
            .fetch_snapshot()
            .await
            .context("failed to fetch sensors")
    })?;

    if globals.json {
        #[derive(serde::Serialize)]
        struct SensorRow<'a> {
            serial: &'a str,
            peripheral_id: String,
            nickname: Option<&'a str>,
        }

        let rows: Vec<SensorRow> = snapshot
            .sensors
            .values()
            .map(|s| SensorRow {
                serial: &s.sensor_serial,
                peripheral_id: s.peripheral_id(),
                nickname: s.fields.get("nickname").and_then(|v| v.as_str()),
            })
            .collect();
        return print_json(&rows);
    }

    if snapshot.sensors.is_empty() {
        println!("No sensors registered.");
        return Ok(());
    }

    let rows = snapshot
        .sensors
        .values()
        .map(|s| {
            vec![
                s.sensor_serial.clone(),
                s.peripheral_id(),
                s.fields
                    .get("nickname")
                    .and_then(|v| v.as_str())
                    .unwrap_or("-")
                    .to_string(),
            ]
        })
        .collect();
    print_table(&["SERIAL", "PERIPHERAL", "NICKNAME"], rows);
    Ok(())
}
