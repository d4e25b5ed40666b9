use super::Globals;
use crate::output::print_json;
use bridge_core::{scheduler, CycleOutcome};

/// `run`: one cycle, then exit.
pub fn once(globals: &Globals<'_>, priority: &[String]) -> anyhow::Result<()> {
    let config = super::load_config(globals.config)?;
    let options = config.sync_options(priority);
    let bridge = super::build_bridge(&config);

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let printer = super::spawn_printer(bridge.subscribe(), globals.json);
        let outcome = match super::login(&bridge, &config, globals.password).await {
            Ok(_) => Ok(bridge.run_cycle(&options).await),
            Err(e) => Err(e),
        };
        // The printer ends once the last handle on the event bus is gone.
        drop(bridge);
        let _ = printer.await;
        outcome
    })?;

    match outcome {
        CycleOutcome::Completed(report) => {
            if globals.json {
                print_json(&report)?;
            } else {
                println!(
                    "Visited {} device(s), {} failed, {} sample(s) uploaded.",
                    report.visited.len(),
                    report.failed.len(),
                    report.samples_uploaded
                );
            }
            Ok(())
        }
        CycleOutcome::SnapshotFailed(e) => Err(anyhow::Error::new(e).context("cycle aborted")),
        CycleOutcome::Skipped => Ok(()),
    }
}

/// `auto`: a cycle now and every `interval` minutes until Ctrl-C.
pub fn automatic(
    globals: &Globals<'_>,
    interval: Option<u64>,
    priority: &[String],
) -> anyhow::Result<()> {
    let config = super::load_config(globals.config)?;
    for w in config.validate() {
        tracing::warn!("{}", w.message);
    }
    let options = config.sync_options(priority);
    let interval = interval.unwrap_or(config.sync.interval_minutes);
    let bridge = super::build_bridge(&config);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let printer = super::spawn_printer(bridge.subscribe(), globals.json);
        super::login(&bridge, &config, globals.password).await?;

        let handle = scheduler::automatic(bridge.clone(), interval, options);
        tokio::signal::ctrl_c().await?;
        tracing::info!("stopping; state was {}", bridge.state());
        handle.stop();
        printer.abort();
        Ok::<(), anyhow::Error>(())
    })
}
