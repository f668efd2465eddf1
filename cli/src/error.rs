//! CLI error types

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IPC error: {0}")]
    IpcError(#[from] ipc::IpcError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::CommandFailed(_) => "CLI001",
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::IpcError(_) => "CLI004",
            CliError::IoError(_) => "CLI005",
        }
    }
}

impl From<warden_core::CoreError> for CliError {
    fn from(err: warden_core::CoreError) -> Self {
        CliError::ConfigError(format!("[{}] {}", err.code(), err))
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
