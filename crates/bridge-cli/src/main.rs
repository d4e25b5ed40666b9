mod cmd;
mod output;
mod peripheral;

use clap::{Parser, Subcommand};
use cmd::Globals;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flower-bridge",
    about = "Sync sensor peripherals with their cloud account, once or on a schedule",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "FLOWER_BRIDGE_CONFIG",
        default_value = "flower-bridge.yaml"
    )]
    config: PathBuf,

    /// Account password (overrides account.password in the config)
    #[arg(long, global = true, env = "FLOWER_BRIDGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Init {
        /// Account username to put in the config
        #[arg(long, short = 'u')]
        username: Option<String>,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Authenticate against the cloud account
    Login,

    /// List the account's sensors and their peripheral identifiers
    Sensors,

    /// Run one sync cycle over every sensor, then exit
    Run {
        /// Device id to visit before the account's sensors (repeatable)
        #[arg(long = "priority", short = 'p')]
        priority: Vec<String>,
    },

    /// Run a cycle now and then every interval until interrupted
    Auto {
        /// Minutes between cycles (default: sync.interval_minutes)
        #[arg(long, short = 'i')]
        interval: Option<u64>,
        /// Device id to visit before the account's sensors (repeatable)
        #[arg(long = "priority", short = 'p')]
        priority: Vec<String>,
    },

    /// Validate the config for common mistakes
    Check,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Auto { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let globals = Globals {
        config: &cli.config,
        password: cli.password.as_deref(),
        json: cli.json,
    };

    let result = match &cli.command {
        Commands::Init { username, force } => {
            cmd::init::run(globals.config, username.as_deref(), *force)
        }
        Commands::Login => cmd::login::run(&globals),
        Commands::Sensors => cmd::sensors::run(&globals),
        Commands::Run { priority } => cmd::run::once(&globals, priority),
        Commands::Auto { interval, priority } => cmd::run::automatic(&globals, *interval, priority),
        Commands::Check => cmd::check::run(globals.config, globals.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
