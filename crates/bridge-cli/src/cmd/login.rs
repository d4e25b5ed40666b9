use super::Globals;
use crate::output::{print_json, REDACTED};

pub fn run(globals: &Globals<'_>) -> anyhow::Result<()> {
    let config = super::load_config(globals.config)?;
    let bridge = super::build_bridge(&config);

    let rt = tokio::runtime::Runtime::new()?;
    let token = rt.block_on(super::login(&bridge, &config, globals.password))?;

    if globals.json {
        print_json(&serde_json::json!({
            "username": config.account.username,
            "access_token": REDACTED,
            "expires_in": token.expires_in,
        }))?;
    } else {
        println!("Logged in as {}.", config.account.username);
        if let Some(secs) = token.expires_in {
            println!("Token valid for {} hours.", secs / 3600);
        }
    }
    Ok(())
}
