//! hazard-cli - run one hazard engine operation and print JSON to stdout.
//!
//! Usage:
//!   hazard-cli assess --detections detections.json --weather weather.json
//!   hazard-cli route --roads roads.json --zones snapshot.json --from 34.0,-118.0 --to 34.0,-117.97 --priority safest

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hazard_cli::{commands, config, Cli};

const DEFAULT_LOG_FILTER: &str = "hazard_cli=info,hazard_core=info";

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = config::load_config(cli.config.as_deref())?;
    let output = commands::run(&cli.command, &config)?;

    let text = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{text}");
    Ok(())
}
