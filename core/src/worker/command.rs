//! Worker backed by an external executable
//!
//! The configured command is spawned in its own process group. Its "message
//! pump" is waiting for the child to exit; an exit request sends SIGTERM to
//! the group, and disposal escalates to SIGKILL if the child is still around.

use super::{Worker, WorkerFactory};
use crate::{CoreError, Result};
use schema::ServiceConfig;
use std::time::Duration;

/// Grace period between SIGTERM and SIGKILL during disposal
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// [`WorkerFactory`] that launches `command` with `base_args` followed by the
/// host's start arguments
#[derive(Debug, Clone)]
pub struct CommandWorkerFactory {
    command: Option<String>,
    base_args: Vec<String>,
    #[cfg_attr(not(unix), allow(dead_code))]
    kill_grace: Duration,
}

impl CommandWorkerFactory {
    pub fn new(command: Option<String>, base_args: Vec<String>) -> Self {
        Self {
            command,
            base_args,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Factory for the worker described by the service configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.worker_command.clone(), config.worker_args.clone())
    }

    /// Override the SIGTERM to SIGKILL grace period
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    #[cfg_attr(not(unix), allow(dead_code))]
    fn full_args(&self, args: &[String]) -> Vec<String> {
        self.base_args.iter().chain(args).cloned().collect()
    }

    fn command(&self) -> Result<&str> {
        match self.command.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => Ok(cmd),
            _ => Err(CoreError::WorkerError(
                "no worker command configured".to_string(),
            )),
        }
    }
}

impl WorkerFactory for CommandWorkerFactory {
    #[cfg(unix)]
    fn construct(&self, args: &[String]) -> Result<Box<dyn Worker>> {
        let command = self.command()?;
        let child = crate::process::unix::spawn(command, &self.full_args(args))?;
        tracing::info!("Worker process started: {} (pid {})", command, child.pid());
        Ok(Box::new(unix_worker::CommandWorker::new(child, self.kill_grace)))
    }

    #[cfg(not(unix))]
    fn construct(&self, args: &[String]) -> Result<Box<dyn Worker>> {
        let command = self.command()?;
        let _ = args;
        Err(CoreError::WorkerError(format!(
            "cannot launch '{command}': command workers require process groups, which this platform lacks"
        )))
    }
}

#[cfg(unix)]
mod unix_worker {
    use super::super::{ExitHandle, Worker};
    use crate::process::unix::{self, ChildProcess};
    use crate::Result;
    use nix::unistd::Pid;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{debug, info};

    #[derive(Debug)]
    pub(super) struct CommandWorker {
        child: ChildProcess,
        exit: Arc<GroupExit>,
        kill_grace: Duration,
    }

    /// Sends SIGTERM to the worker's group until the child has been reaped
    #[derive(Debug)]
    struct GroupExit {
        pgid: Pid,
        reaped: AtomicBool,
    }

    impl ExitHandle for GroupExit {
        fn request_exit(&self) -> Result<()> {
            if self.reaped.load(Ordering::Acquire) {
                debug!("Worker group {} already reaped", self.pgid);
                return Ok(());
            }
            unix::signal_term_group(self.pgid)
        }
    }

    impl CommandWorker {
        pub(super) fn new(child: ChildProcess, kill_grace: Duration) -> Self {
            let exit = Arc::new(GroupExit {
                pgid: child.pgid(),
                reaped: AtomicBool::new(false),
            });
            Self {
                child,
                exit,
                kill_grace,
            }
        }
    }

    impl Worker for CommandWorker {
        fn run(&mut self) -> Result<()> {
            let status = self.child.wait()?;
            self.exit.reaped.store(true, Ordering::Release);
            info!("Worker process {} exited: {}", self.child.pid(), status);
            Ok(())
        }

        fn exit_handle(&self) -> Arc<dyn ExitHandle> {
            self.exit.clone()
        }

        fn dispose(mut self: Box<Self>) -> Result<()> {
            if self.child.try_wait()?.is_some() {
                self.exit.reaped.store(true, Ordering::Release);
                return Ok(());
            }
            let status = unix::terminate_with_timeout(&mut self.child, self.kill_grace)?;
            self.exit.reaped.store(true, Ordering::Release);
            debug!("Worker process {} disposed: {}", self.child.pid(), status);
            Ok(())
        }
    }
}
