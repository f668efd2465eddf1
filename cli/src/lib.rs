//! Client side of the `warden` command-line tool
//!
//! The kill switch never answers, so success means the line was delivered
//! and the service closed the connection after reading it.

#![allow(unused_crate_dependencies)]

pub mod error;

pub use error::{CliError, Result};

use ipc::KillSwitchClient;
use schema::ServiceConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Where and how to reach the kill switch
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Overrides the configured Unix socket path
    pub socket: Option<PathBuf>,
    /// Overrides the configured Windows pipe name
    pub pipe: Option<String>,
    /// How long to keep retrying the connection
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            socket: None,
            pipe: None,
            connect_timeout: ipc::client::DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// CLI client for the kill-switch channel
#[derive(Debug, Clone)]
pub struct Client {
    inner: KillSwitchClient,
}

impl Client {
    pub fn new(config: &ServiceConfig, options: ClientOptions) -> Self {
        let socket = options.socket.unwrap_or_else(|| config.socket_path.clone());
        let pipe = options.pipe.unwrap_or_else(|| config.pipe_name());
        let inner = KillSwitchClient::new(socket, pipe).with_connect_timeout(options.connect_timeout);
        Self { inner }
    }

    /// Ask the service to terminate every worker process
    pub async fn kill(&self) -> Result<()> {
        info!("Sending kill command");
        self.inner.kill().await?;
        println!("✓ Kill command delivered");
        Ok(())
    }

    /// Send one arbitrary line
    pub async fn send(&self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Err(CliError::InvalidArgument("line must not be empty".to_string()));
        }
        if line.contains(['\n', '\r']) {
            return Err(CliError::InvalidArgument(
                "line must not contain line breaks".to_string(),
            ));
        }
        info!("Sending line {:?}", line);
        self.inner.send_line(line).await?;
        println!("✓ Line delivered");
        Ok(())
    }
}
