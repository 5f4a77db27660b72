use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tracedbg")]
#[command(about = "Call-level debugger for traced graphics processes")]
#[command(version)]
pub struct Cli {
    /// Directory holding config.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log to the default log file when no log.file is configured
    #[arg(long, global = true)]
    pub log_to_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a traced process and control it from the console
    Attach {
        /// `host:port`, a bare port, or `unix:/path` (defaults to connection.endpoint)
        endpoint: Option<String>,
    },
    /// Run a synthetic traced process that waits for a controller
    DemoPeer {
        /// Address to listen on (defaults to connection.endpoint)
        endpoint: Option<String>,

        /// Stop after this many frames instead of running until terminated
        #[arg(long)]
        frames: Option<u64>,
    },
}
