//! ett - TCP tunnel
//!
//! Reads a list of tunnels from a TOML file and runs them all:
//! - Plain relays between a source and a destination
//! - AES-GCM framing on one side (encrypt) or the other (decrypt)
//! - Optional seeded XOR obfuscation of the wire

use anyhow::{Context, Result};
use clap::Parser;
use ett::config::{expand_home, generate_example_config, Config, LoggingConfig};
use ett::tunnel::{StopPolicy, Supervisor};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// ett - encrypting TCP tunnel
#[derive(Parser, Debug)]
#[command(name = "ett")]
#[command(about = "Encrypted TCP tunnel")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/ett/ett.toml")]
    conf: String,

    /// Exit as soon as any tunnel stops instead of waiting for all of them
    #[arg(long)]
    first: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    example: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.example {
        print!("{}", generate_example_config().to_toml()?);
        return Ok(());
    }

    let path = expand_home(&args.conf);
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    init_logging(&config.logging, args.log_level.as_deref())?;

    let tunnels = config
        .tunnel_descriptors()
        .context("Invalid configuration")?;

    if args.check {
        info!("Configuration OK: {} tunnel(s)", tunnels.len());
        return Ok(());
    }

    info!("ett v{} starting {} tunnel(s)", ett::VERSION, tunnels.len());

    let supervisor = Supervisor::new(tunnels, StopPolicy::from_exit_on_first(args.first));

    tokio::select! {
        stopped = supervisor.run() => {
            for signal in stopped.iter().filter(|s| s.reason.is_none()) {
                error!("Tunnel {} ended unexpectedly", signal.tunnel);
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

/// Install the global subscriber. `override_level` wins over the config file.
fn init_logging(logging: &LoggingConfig, override_level: Option<&str>) -> Result<()> {
    let level = override_level.unwrap_or(&logging.level);
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("Invalid log level: {}", level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
    Ok(())
}
