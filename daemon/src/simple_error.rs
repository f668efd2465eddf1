//! Simple daemon error types

use warden_core::CoreError;

#[derive(Debug)]
pub enum DaemonError {
    StartupError(String),
    CoreError(CoreError),
    IoError(std::io::Error),
}

impl DaemonError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::StartupError(_) => "DAEMON001",
            DaemonError::CoreError(_) => "DAEMON002",
            DaemonError::IoError(_) => "DAEMON003",
        }
    }
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::StartupError(msg) => write!(f, "Startup error: {}", msg),
            DaemonError::CoreError(err) => write!(f, "Core error [{}]: {}", err.code(), err),
            DaemonError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::CoreError(err) => Some(err),
            DaemonError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(err: std::io::Error) -> Self {
        DaemonError::IoError(err)
    }
}

impl From<CoreError> for DaemonError {
    fn from(err: CoreError) -> Self {
        DaemonError::CoreError(err)
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
