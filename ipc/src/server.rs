//! Kill-switch listener over a Unix socket (Unix) or named pipe (Windows)
//!
//! The listener serves exactly one peer per channel instance. Each iteration
//! of its loop:
//!
//! 1. opens a fresh inbound channel instance under the well-known name
//! 2. waits for one peer
//! 3. reads one line (at most [`MAX_LINE_BYTES`])
//! 4. on `KILL`, terminates every live process named like the worker
//! 5. closes the instance and starts over
//!
//! Nothing is ever written back to the peer. Open, accept and read failures
//! are logged and followed by one back-off delay; they never end the loop.
//! The only way out is the [`ShutdownFlag`], whose token is raced against
//! every await point, so a stop never waits for a peer to show up.
//!
//! Any local principal that can open the channel can issue the command;
//! there is no authentication beyond the OS defaults for the endpoint.

use crate::{IpcError, Result};
use schema::{KillCommand, ServiceConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};
use warden_core::{error_chain, DiagnosticsLog, ProcessTable, ShutdownFlag};

/// Longest command line accepted; longer input is read up to this bound and
/// treated as an unrecognized command
pub const MAX_LINE_BYTES: usize = 4096;

/// How long a connected peer may take to deliver its line
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the kill-switch listener
#[derive(Debug, Clone)]
pub struct KillSwitchConfig {
    /// Socket path (Unix)
    pub socket_path: PathBuf,
    /// Full named pipe path (Windows), e.g. `\\.\pipe\mesh-assistant-killswitch`
    pub pipe_name: String,
    /// Image name of the processes a `KILL` terminates
    pub target_process_name: String,
    /// Delay after a channel failure
    pub backoff: Duration,
    /// Limit for reading the command line once a peer is connected
    pub read_timeout: Duration,
}

impl KillSwitchConfig {
    /// Listener settings derived from the service configuration
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            pipe_name: config.pipe_name(),
            target_process_name: config.worker_process_name.clone(),
            backoff: config.backoff(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Human readable channel address for log records
    pub fn endpoint(&self) -> String {
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

/// Counters describing what the listener loop has done so far
#[derive(Debug, Default)]
pub struct ListenerStats {
    connections: AtomicU64,
    commands: AtomicU64,
    channel_failures: AtomicU64,
    backoffs: AtomicU64,
}

/// Point-in-time copy of [`ListenerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStatsSnapshot {
    /// Peers accepted
    pub connections: u64,
    /// Lines read and dispatched
    pub commands: u64,
    /// Open, accept and read failures
    pub channel_failures: u64,
    /// Back-off delays started
    pub backoffs: u64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            connections: self.connections.load(Ordering::Acquire),
            commands: self.commands.load(Ordering::Acquire),
            channel_failures: self.channel_failures.load(Ordering::Acquire),
            backoffs: self.backoffs.load(Ordering::Acquire),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::AcqRel);
    }
}

/// Result of one termination batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminationReport {
    /// Processes discovered by name
    pub matched: usize,
    /// Terminations that succeeded
    pub terminated: usize,
    /// Terminations that failed
    pub failed: usize,
}

/// Outcome of one channel iteration
enum Iteration {
    Served,
    Cancelled,
}

/// Single-command local control channel
#[derive(Debug)]
pub struct KillSwitchListener {
    config: KillSwitchConfig,
    table: Arc<dyn ProcessTable>,
    diagnostics: Arc<DiagnosticsLog>,
    shutdown: ShutdownFlag,
    stats: Arc<ListenerStats>,
}

impl KillSwitchListener {
    /// Create a listener; nothing is opened until [`KillSwitchListener::run`]
    pub fn new(
        config: KillSwitchConfig,
        table: Arc<dyn ProcessTable>,
        diagnostics: Arc<DiagnosticsLog>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            config,
            table,
            diagnostics,
            shutdown,
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Shared counters, readable while the loop runs
    pub fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    /// Run the accept/read/terminate loop until the shutdown flag is cleared
    pub async fn run(self) {
        self.diagnostics.log(format!(
            "Kill-switch listener started on {}",
            self.config.endpoint()
        ));

        while self.shutdown.is_running() {
            match self.serve_once().await {
                Ok(Iteration::Served) => {}
                Ok(Iteration::Cancelled) => break,
                Err(e) => {
                    if !self.shutdown.is_running() {
                        debug!("Channel error during shutdown ignored: {}", e);
                        break;
                    }
                    ListenerStats::bump(&self.stats.channel_failures);
                    self.diagnostics
                        .log(format!("ChannelFailure: [{}] {}", e.code(), e));

                    ListenerStats::bump(&self.stats.backoffs);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.backoff) => {}
                    }
                }
            }
        }

        self.diagnostics.log("Kill-switch listener stopped");
    }

    #[cfg(unix)]
    async fn serve_once(&self) -> Result<Iteration> {
        use tokio::net::UnixListener;

        let path = &self.config.socket_path;
        remove_stale_socket(path)?;

        let listener = UnixListener::bind(path).map_err(|e| {
            IpcError::BindFailed(format!("Failed to bind {:?}: {}", path, e))
        })?;
        let _cleanup = SocketFileGuard(path);
        debug!("Kill-switch channel instance open at {:?}", path);

        let mut stream = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Iteration::Cancelled),
            accepted = listener.accept() => {
                accepted.map_err(|e| IpcError::AcceptFailed(e.to_string()))?.0
            }
        };
        // One peer per instance: nobody else can connect from here on
        drop(listener);

        let outcome = self.serve_peer(&mut stream).await;
        drop(stream);
        outcome
    }

    #[cfg(windows)]
    async fn serve_once(&self) -> Result<Iteration> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let mut server = ServerOptions::new()
            .first_pipe_instance(true)
            .max_instances(1)
            .access_inbound(true)
            .access_outbound(false)
            .create(&self.config.pipe_name)
            .map_err(|e| {
                IpcError::BindFailed(format!(
                    "Failed to create pipe {}: {}",
                    self.config.pipe_name, e
                ))
            })?;

        tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Iteration::Cancelled),
            connected = server.connect() => {
                connected.map_err(|e| IpcError::AcceptFailed(e.to_string()))?
            }
        };

        let outcome = self.serve_peer(&mut server).await;
        if let Err(e) = server.disconnect() {
            debug!("Pipe disconnect failed: {}", e);
        }
        outcome
    }

    #[cfg(all(not(unix), not(windows)))]
    async fn serve_once(&self) -> Result<Iteration> {
        Err(IpcError::Unsupported(
            "no local channel implementation for this platform".to_string(),
        ))
    }

    /// Read one line from a connected peer and act on it. The caller closes
    /// the connection afterwards, so the peer sees EOF only once the command
    /// has been carried out.
    async fn serve_peer<S>(&self, stream: &mut S) -> Result<Iteration>
    where
        S: AsyncRead + Unpin,
    {
        ListenerStats::bump(&self.stats.connections);
        self.diagnostics.log("Kill-switch connection accepted");

        let line = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Iteration::Cancelled),
            read = tokio::time::timeout(self.config.read_timeout, read_command_line(&mut *stream)) => {
                read.map_err(|_| {
                    IpcError::Timeout(format!(
                        "peer sent no complete line within {:?}",
                        self.config.read_timeout
                    ))
                })??
            }
        };

        ListenerStats::bump(&self.stats.commands);
        let command = KillCommand::parse(&line);
        self.dispatch(command).await;
        Ok(Iteration::Served)
    }

    async fn dispatch(&self, command: KillCommand) {
        match command {
            KillCommand::Kill => {
                self.diagnostics.log("Kill command received");
                let table = self.table.clone();
                let diagnostics = self.diagnostics.clone();
                let target = self.config.target_process_name.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    terminate_matching(table.as_ref(), &diagnostics, &target)
                })
                .await;
                match outcome {
                    Ok(report) => info!(
                        "Kill command finished: {} matched, {} terminated, {} failed",
                        report.matched, report.terminated, report.failed
                    ),
                    Err(e) => self
                        .diagnostics
                        .log(format!("TerminationFailure: termination task aborted: {}", e)),
                }
            }
            KillCommand::Empty => {
                debug!("Peer closed without sending a command");
            }
            KillCommand::Unrecognized(text) => {
                let shown: String = text.chars().take(64).collect();
                self.diagnostics
                    .log(format!("Ignoring unrecognized command {:?}", shown));
            }
        }
    }
}

/// Terminate every live process named `target`, one at a time
///
/// A failure on one process is logged and does not stop the others.
pub fn terminate_matching(
    table: &dyn ProcessTable,
    diagnostics: &DiagnosticsLog,
    target: &str,
) -> TerminationReport {
    let handles = match table.find_by_name(target) {
        Ok(handles) => handles,
        Err(e) => {
            diagnostics.log(format!(
                "TerminationFailure: could not enumerate processes named {}: [{}] {}",
                target,
                e.code(),
                error_chain(&e)
            ));
            return TerminationReport::default();
        }
    };

    let mut report = TerminationReport {
        matched: handles.len(),
        ..TerminationReport::default()
    };
    if handles.is_empty() {
        diagnostics.log(format!("No running processes named {}", target));
        return report;
    }

    for handle in &handles {
        match table.terminate(handle) {
            Ok(()) => {
                report.terminated += 1;
                diagnostics.log(format!("Terminated {}", handle));
            }
            Err(e) => {
                report.failed += 1;
                diagnostics.log(format!(
                    "TerminationFailure: could not terminate {}: [{}] {}",
                    handle,
                    e.code(),
                    error_chain(&e)
                ));
            }
        }
    }
    report
}

/// Read a single line, stopping at `\n`, EOF or [`MAX_LINE_BYTES`]
pub async fn read_command_line<R>(reader: R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut limited = BufReader::new(reader.take(MAX_LINE_BYTES as u64 + 1));
    let mut buf = Vec::with_capacity(64);
    limited
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| IpcError::ReadFailed(e.to_string()))?;

    if buf.len() > MAX_LINE_BYTES {
        warn!("Command line exceeds {} bytes; ignoring", MAX_LINE_BYTES);
        buf.truncate(MAX_LINE_BYTES);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Unlink a leftover socket file. A socket that still accepts connections
/// belongs to another live listener and is left alone.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> Result<()> {
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(IpcError::BindFailed(format!(
            "Another listener is active on {:?}",
            path
        )));
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed existing socket at {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IpcError::BindFailed(format!(
            "Failed to remove existing socket {:?}: {}",
            path, e
        ))),
    }
}

/// Unlinks the socket file when the channel instance closes
#[cfg(unix)]
struct SocketFileGuard<'a>(&'a std::path::Path);

#[cfg(unix)]
impl Drop for SocketFileGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove socket {:?}: {}", self.0, e);
            }
        }
    }
}
