use bridge_core::BridgeConfig;
use std::path::Path;

pub fn run(config_path: &Path, username: Option<&str>, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut config = BridgeConfig::default();
    if let Some(username) = username {
        config.account.username = username.to_string();
    }
    config.save(config_path)?;

    println!("Wrote {}.", config_path.display());
    println!("Fill in api.client_id, api.client_secret and peripheral.command, then run `flower-bridge check`.");
    Ok(())
}
