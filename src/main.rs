mod cli;
mod console;
mod demo;
mod logging;

use std::env;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;

use tracedbg_config::{default_config_dir, load_config, Config};
use tracedbg_net::Endpoint;

use crate::cli::{Cli, Command};

fn resolve_endpoint(arg: Option<&str>, config: &Config) -> Result<Endpoint> {
    let text = arg.unwrap_or(&config.connection.endpoint);
    text.parse::<Endpoint>()
        .map_err(|e| anyhow!("bad endpoint {text:?}: {e}"))
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => default_config_dir().context("no platform config directory; pass --config-dir")?,
    };
    let project_dir = env::current_dir().ok();
    let mut config = load_config(&config_dir, project_dir.as_deref())
        .with_context(|| format!("failed to load config from {}", config_dir.display()))?;

    if cli.log_to_file && config.log.file.is_none() {
        config.log.file = Some(logging::default_log_file_path());
    }
    logging::init(&config.log, cli.log_level.as_deref())?;
    info!("tracedbg {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Attach { endpoint } => {
            let endpoint = resolve_endpoint(endpoint.as_deref(), &config)?;
            console::run(&config, endpoint)
        }
        Command::DemoPeer { endpoint, frames } => {
            let endpoint = resolve_endpoint(endpoint.as_deref(), &config)?;
            demo::run(&config, endpoint, frames)
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("tracedbg: {:#}", e);
        std::process::exit(1);
    }
}
