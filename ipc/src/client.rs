//! Kill-switch client
//!
//! Connects to the listener, writes one line and waits for the listener to
//! close the connection, which it does only after acting on the line. The
//! listener reopens its channel between peers, so connecting is retried
//! until the connect timeout runs out.

use crate::{IpcError, Result};
use schema::{ServiceConfig, KILL_LITERAL};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default limit for reaching the listener
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default limit for the listener to finish with our line
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Client for the kill-switch channel
#[derive(Debug, Clone)]
pub struct KillSwitchClient {
    #[cfg_attr(windows, allow(dead_code))]
    socket_path: PathBuf,
    #[cfg_attr(not(windows), allow(dead_code))]
    pipe_name: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl KillSwitchClient {
    pub fn new(socket_path: impl Into<PathBuf>, pipe_name: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            pipe_name: pipe_name.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Client for the channel named in the service configuration
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self::new(config.socket_path.clone(), config.pipe_name())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Send the `KILL` command
    pub async fn kill(&self) -> Result<()> {
        self.send_line(KILL_LITERAL).await
    }

    /// Send one arbitrary line. The line must not contain a line break.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        if line.contains(['\n', '\r']) {
            return Err(IpcError::ProtocolError(
                "command must be a single line".to_string(),
            ));
        }
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        self.send_frame(&frame).await
    }

    #[cfg(unix)]
    async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::UnixStream;

        let path = self.socket_path.clone();
        let mut stream = self
            .connect_with_retry(|| UnixStream::connect(path.clone()))
            .await?;

        stream
            .write_all(frame)
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;
        stream
            .shutdown()
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;

        // The listener never replies; EOF means it is done with the line
        let mut sink = [0_u8; 64];
        let drained = tokio::time::timeout(self.response_timeout, async {
            loop {
                match stream.read(&mut sink).await {
                    Ok(0) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => return Ok(()),
                    Err(e) => return Err(IpcError::ConnectionFailed(e.to_string())),
                }
            }
        })
        .await;

        match drained {
            Ok(result) => result,
            Err(_) => Err(IpcError::Timeout(format!(
                "listener did not close the connection within {:?}",
                self.response_timeout
            ))),
        }
    }

    #[cfg(windows)]
    async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        use tokio::net::windows::named_pipe::ClientOptions;

        let name = self.pipe_name.clone();
        let mut client = self
            .connect_with_retry(|| {
                let name = name.clone();
                async move { ClientOptions::new().read(false).write(true).open(&name) }
            })
            .await?;

        client
            .write_all(frame)
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;
        client
            .flush()
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;
        Ok(())
    }

    #[cfg(all(not(unix), not(windows)))]
    async fn send_frame(&self, _frame: &[u8]) -> Result<()> {
        Err(IpcError::Unsupported(
            "no local channel implementation for this platform".to_string(),
        ))
    }

    async fn connect_with_retry<T, F, Fut>(&self, mut connect: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::io::Result<T>>,
    {
        let deadline = Instant::now() + self.connect_timeout;
        loop {
            match connect().await {
                Ok(conn) => return Ok(conn),
                Err(e) if Instant::now() < deadline && is_transient(&e) => {
                    debug!("Kill-switch channel not ready ({}); retrying", e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(IpcError::ConnectionFailed(format!(
                        "{}: {}",
                        self.endpoint(),
                        e
                    )))
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        #[cfg(windows)]
        {
            self.pipe_name.clone()
        }
        #[cfg(not(windows))]
        {
            self.socket_path.display().to_string()
        }
    }
}

/// Errors seen while the listener is between channel instances
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) {
        return true;
    }
    // ERROR_PIPE_BUSY
    cfg!(windows) && e.raw_os_error() == Some(231)
}
