//! Core functionality for the warden service supervisor
//!
//! This crate contains the pieces shared by the daemon, the kill-switch
//! listener and the CLI: the diagnostics log, the shutdown flag, process
//! discovery and termination, worker supervision and configuration loading.

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod shutdown;
pub mod worker;


// Re-export schema types for convenience
pub use schema::*;

pub use error::{error_chain, CoreError, Result};
pub use logging::{DiagnosticsLog, FallbackSink, LogRecord, NullSink};
pub use process::{ProcessTable, SystemProcessTable};
pub use shutdown::ShutdownFlag;
pub use worker::{CommandWorkerFactory, ExitHandle, Worker, WorkerFactory, WorkerSupervisor};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level`.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
