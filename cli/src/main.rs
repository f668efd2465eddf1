//! Warden CLI binary
//!
//! Sends a single line over the kill-switch channel of a running `wardend`.

#![allow(unused_crate_dependencies)]

use clap::{Parser, Subcommand};
use cli::{Client, ClientOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use warden_core::config::resolve_service_config;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Talk to the warden kill switch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Service configuration file the channel name is read from
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Unix socket path of the kill switch
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Named pipe of the kill switch (Windows)
    #[arg(long)]
    pipe: Option<String>,

    /// Seconds to keep retrying the connection
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Terminate every running worker process
    Kill,
    /// Send an arbitrary single line
    Send {
        /// The line to send
        line: String,
    },
}

#[tokio::main]
async fn main() -> cli::Result<()> {
    let _ = warden_core::utils::init_tracing("warn");

    let args = Cli::parse();
    let config = resolve_service_config(args.config.as_deref())?;

    let client = Client::new(
        &config,
        ClientOptions {
            socket: args.socket,
            pipe: args.pipe,
            connect_timeout: Duration::from_secs(args.timeout),
        },
    );

    let result = match &args.command {
        Commands::Kill => client.kill().await,
        Commands::Send { line } => client.send(line).await,
    };

    if let Err(e) = &result {
        error!("[{}] {}", e.code(), e);
    }
    result
}
