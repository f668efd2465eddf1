//! Service configuration and state types for the warden supervisor
//!
//! ## Service Lifecycle
//!
//! The supervisor moves through the following states, driven only by the
//! host's start/stop callbacks:
//! - `Stopped`: nothing is running
//! - `Starting`: worker and kill-switch listener are being launched
//! - `Running`: listener active; the worker may be absent if it crashed
//! - `Stopping`: background activity is being unwound

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle state of the supervisor service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum ServiceState {
    /// Nothing is running
    #[default]
    Stopped,
    /// Start has been requested and subsystems are coming up
    Starting,
    /// Subsystems launched
    Running,
    /// Stop has been requested and subsystems are being torn down
    Stopping,
}

impl ServiceState {
    /// Check if the service is in a transitional state
    pub fn is_transitional(&self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Stopping)
    }

    /// Stable uppercase label used in log records
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "STOPPED",
            ServiceState::Starting => "STARTING",
            ServiceState::Running => "RUNNING",
            ServiceState::Stopping => "STOPPING",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OS process discovered by name; only valid for a single termination attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Numeric process id
    pub pid: u32,
    /// Image name the process was matched by
    pub name: String,
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.name, self.pid)
    }
}

/// Well-known service name; also the system log source
pub const DEFAULT_SERVICE_NAME: &str = "MeshCentralAssistant";

/// Image name of the worker process targeted by the kill switch
pub const DEFAULT_WORKER_PROCESS_NAME: &str = "MeshCentralAssistant";

/// Well-known kill-switch channel name
pub const DEFAULT_CHANNEL_NAME: &str = "mesh-assistant-killswitch";

/// Service configuration, every field defaulted to the fixed well-known values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name the service is registered under with the host
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Image name matched when the kill switch enumerates processes
    #[serde(default = "default_worker_process_name")]
    pub worker_process_name: String,

    /// Executable launched as the worker workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_command: Option<String>,

    /// Extra arguments for the worker, placed before the host start args
    #[serde(default)]
    pub worker_args: Vec<String>,

    /// Kill-switch channel name (named pipe name on Windows)
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Kill-switch socket path (Unix)
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Append-only diagnostics log file
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Default tracing filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Delay after a channel failure before the listener retries
    #[serde(default = "default_backoff_millis")]
    pub backoff_millis: u64,

    /// Extra start time requested from the host before launching the worker
    #[serde(default = "default_startup_extension_secs")]
    pub startup_extension_secs: u64,

    /// Budget for a complete stop
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// How long stop waits for the worker thread after requesting exit
    #[serde(default = "default_worker_exit_timeout_secs")]
    pub worker_exit_timeout_secs: u64,
}

impl ServiceConfig {
    /// Back-off delay as a Duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_millis)
    }

    /// Startup extension as a Duration
    pub fn startup_extension(&self) -> Duration {
        Duration::from_secs(self.startup_extension_secs)
    }

    /// Stop budget as a Duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Worker exit wait as a Duration
    pub fn worker_exit_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_exit_timeout_secs)
    }

    /// Full named pipe path for the kill-switch channel
    pub fn pipe_name(&self) -> String {
        format!(r"\\.\pipe\{}", self.channel_name)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            worker_process_name: default_worker_process_name(),
            worker_command: None,
            worker_args: Vec::new(),
            channel_name: default_channel_name(),
            socket_path: default_socket_path(),
            log_file: default_log_file(),
            log_level: default_log_level(),
            backoff_millis: default_backoff_millis(),
            startup_extension_secs: default_startup_extension_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            worker_exit_timeout_secs: default_worker_exit_timeout_secs(),
        }
    }
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_worker_process_name() -> String {
    DEFAULT_WORKER_PROCESS_NAME.to_string()
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(format!("/tmp/{DEFAULT_CHANNEL_NAME}.sock"))
}

#[cfg(windows)]
fn default_log_file() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\MeshAssistant\service.log")
}

#[cfg(not(windows))]
fn default_log_file() -> PathBuf {
    PathBuf::from("/var/log/mesh-assistant/service.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_backoff_millis() -> u64 {
    1000
}

const fn default_startup_extension_secs() -> u64 {
    30
}

const fn default_stop_timeout_secs() -> u64 {
    20
}

const fn default_worker_exit_timeout_secs() -> u64 {
    10
}
