//! IPC error types and utilities

use thiserror::Error;

/// IPC-specific error types
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to open channel: {0}")]
    BindFailed(String),

    #[error("Failed to accept connection: {0}")]
    AcceptFailed(String),

    #[error("Failed to read command: {0}")]
    ReadFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send command: {0}")]
    SendFailed(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

impl IpcError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            IpcError::BindFailed(_) => "IPC001",
            IpcError::AcceptFailed(_) => "IPC002",
            IpcError::ReadFailed(_) => "IPC003",
            IpcError::ConnectionFailed(_) => "IPC004",
            IpcError::SendFailed(_) => "IPC005",
            IpcError::ProtocolError(_) => "IPC006",
            IpcError::Timeout(_) => "IPC007",
            IpcError::Unsupported(_) => "IPC008",
        }
    }
}

/// IPC-specific result type
pub type Result<T> = std::result::Result<T, IpcError>;
