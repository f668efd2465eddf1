//! Worker supervision
//!
//! The worker workload is an external collaborator reached through three
//! traits:
//!
//! - [`WorkerFactory`]: constructs a worker from the host's start arguments
//! - [`Worker`]: runs a blocking message pump, then gets disposed
//! - [`ExitHandle`]: asks a running pump to return, callable from any thread
//!
//! [`WorkerSupervisor`] owns one dedicated OS thread per launch. Construction,
//! the pump and disposal all happen on that thread, so the worker itself
//! never has to be `Send`. Errors and panics from any phase are caught at the
//! thread boundary and written to the diagnostics log; the service process
//! never goes down because of the worker.
//!
//! ## Shutdown
//!
//! [`WorkerSupervisor::shutdown`] requests exit and then waits a bounded time
//! for the thread. A worker that ignores the request is detached and logged,
//! never aborted.

use crate::error::error_chain;
use crate::logging::DiagnosticsLog;
use crate::{CoreError, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod command;

pub use command::CommandWorkerFactory;

/// Name of the dedicated worker thread
pub const WORKER_THREAD_NAME: &str = "warden-worker";

/// A constructed worker workload
pub trait Worker {
    /// Enter the message pump. Blocks until exit is requested or the
    /// workload ends on its own.
    fn run(&mut self) -> Result<()>;

    /// Handle that makes [`Worker::run`] return
    fn exit_handle(&self) -> Arc<dyn ExitHandle>;

    /// Release the workload's resources
    fn dispose(self: Box<Self>) -> Result<()>;
}

/// Cross-thread exit request for a running pump
pub trait ExitHandle: Send + Sync {
    /// Ask the pump to return. Must not block on the pump.
    fn request_exit(&self) -> Result<()>;
}

/// Builds workers on the worker thread
pub trait WorkerFactory: Send + Sync + std::fmt::Debug {
    /// Construct a worker from the host's start arguments
    fn construct(&self, args: &[String]) -> Result<Box<dyn Worker>>;
}

#[derive(Default)]
struct ExitSlot {
    requested: bool,
    handle: Option<Arc<dyn ExitHandle>>,
}

impl std::fmt::Debug for ExitSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitSlot")
            .field("requested", &self.requested)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

/// Owner of the dedicated worker thread
#[derive(Debug)]
pub struct WorkerSupervisor {
    thread: Option<JoinHandle<()>>,
    slot: Arc<Mutex<ExitSlot>>,
    diagnostics: Arc<DiagnosticsLog>,
    exit_timeout: Duration,
}

impl WorkerSupervisor {
    /// Start the worker thread. Returns once the thread exists; construction
    /// happens asynchronously on that thread and its failure only degrades
    /// the service.
    pub fn launch(
        factory: Arc<dyn WorkerFactory>,
        diagnostics: Arc<DiagnosticsLog>,
        args: Vec<String>,
        exit_timeout: Duration,
    ) -> Result<Self> {
        let slot = Arc::new(Mutex::new(ExitSlot::default()));
        let thread_slot = slot.clone();
        let thread_diag = diagnostics.clone();

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(factory.as_ref(), &thread_diag, &thread_slot, &args))
            .map_err(|e| {
                CoreError::InitializationError(format!("failed to start worker thread: {e}"))
            })?;

        debug!("Worker thread launched");
        Ok(Self {
            thread: Some(thread),
            slot,
            diagnostics,
            exit_timeout,
        })
    }

    /// Whether the worker thread is still running
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Request exit, wait up to the exit timeout, and join the thread.
    ///
    /// Returns `true` if the thread finished, `false` if it was detached.
    /// Never fails; every problem is logged.
    pub fn shutdown(mut self) -> bool {
        self.request_exit();

        let Some(thread) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + self.exit_timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                self.diagnostics.log(format!(
                    "TeardownFailure: worker did not exit within {:?}; detaching worker thread",
                    self.exit_timeout
                ));
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        if thread.join().is_err() {
            // Panics are caught inside the thread; reaching this is a bug in the guard
            warn!("worker thread terminated by an uncaught panic");
        }
        debug!("Worker thread joined");
        true
    }

    fn request_exit(&self) {
        let handle = match self.slot.lock() {
            Ok(mut slot) => {
                slot.requested = true;
                slot.handle.clone()
            }
            Err(poisoned) => {
                let mut slot = poisoned.into_inner();
                slot.requested = true;
                slot.handle.clone()
            }
        };

        match handle {
            Some(handle) => {
                guarded(&self.diagnostics, "TeardownFailure: worker exit request", || {
                    handle.request_exit()
                });
            }
            None => debug!("No live worker to signal"),
        }
    }
}

fn run_worker(
    factory: &dyn WorkerFactory,
    diagnostics: &DiagnosticsLog,
    slot: &Mutex<ExitSlot>,
    args: &[String],
) {
    let Some(mut worker) = guarded(diagnostics, "StartupFailure: worker construction", || {
        factory.construct(args)
    }) else {
        return;
    };

    let handle = worker.exit_handle();
    let already_requested = {
        let mut slot = slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.handle = Some(handle.clone());
        slot.requested
    };
    if already_requested {
        guarded(diagnostics, "TeardownFailure: worker exit request", || {
            handle.request_exit()
        });
    }

    diagnostics.log("Worker running");
    if guarded(diagnostics, "Worker message pump", || worker.run()).is_some() {
        diagnostics.log("Worker message pump exited");
    }

    slot.lock().unwrap_or_else(|p| p.into_inner()).handle = None;

    if guarded(diagnostics, "TeardownFailure: worker dispose", move || {
        worker.dispose()
    })
    .is_some()
    {
        diagnostics.log("Worker disposed");
    }
}

/// Run one worker phase, converting errors and panics into log records
fn guarded<T>(
    diagnostics: &DiagnosticsLog,
    phase: &str,
    f: impl FnOnce() -> Result<T>,
) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            diagnostics.log(format!("{phase} failed: [{}] {}", e.code(), error_chain(&e)));
            None
        }
        Err(payload) => {
            diagnostics.log(format!(
                "{phase} panicked: {}",
                panic_message(payload.as_ref())
            ));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
