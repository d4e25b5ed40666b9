use bridge_core::{DeviceStatus, LifecycleEvent};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

/// Stands in for credentials in anything printed.
pub const REDACTED: &str = "<redacted>";

/// One line per event: compact JSON, or a timestamped human line. Access
/// tokens are never printed.
pub fn format_event(event: &LifecycleEvent, json: bool) -> String {
    if json {
        let redacted;
        let event = match event {
            LifecycleEvent::LoginSucceeded { at, .. } => {
                redacted = LifecycleEvent::LoginSucceeded {
                    token: REDACTED.to_string(),
                    at: *at,
                };
                &redacted
            }
            other => other,
        };
        return serde_json::to_string(event).unwrap_or_default();
    }
    let at = event.at().format("%Y-%m-%d %H:%M:%S");
    match event {
        LifecycleEvent::Info { message, .. } => format!("{at}  info   {message}"),
        LifecycleEvent::Error { message, .. } => format!("{at}  error  {message}"),
        LifecycleEvent::LoginSucceeded { .. } => format!("{at}  login  ok"),
        LifecycleEvent::DeviceProcessed(p) => {
            let state = match &p.status {
                DeviceStatus::InProgress { stage } => stage.clone(),
                DeviceStatus::Disconnected => match (&p.error, &p.summary) {
                    (Some(e), _) => format!("disconnected ({e})"),
                    (None, Some(s)) => format!("disconnected ({} samples)", s.samples_uploaded),
                    (None, None) => "disconnected".to_string(),
                },
            };
            format!("{at}  device {}  {state}", p.device_id)
        }
    }
}
