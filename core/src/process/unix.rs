//! Unix worker process management using process groups
//!
//! The worker executable is spawned in its own session via `setsid()`, so
//! signalling the negative pid reaches the worker and everything it forked.
//! SIGTERM is the cooperative exit request; SIGKILL is the escalation used
//! during disposal.
//!
//! These helpers are blocking and run on the worker's dedicated thread, which
//! has no async runtime.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// A child process leading its own process group
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Get the process group ID (same as PID for session leaders)
    pub fn pgid(&self) -> Pid {
        self.pid
    }

    /// Block until the process exits
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Try to wait for the process to exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }
}

/// Spawn `cmd` with `args` in a new session and process group
///
/// Standard input is closed; output is inherited so the worker's own
/// diagnostics reach the service manager's journal.
pub fn spawn(cmd: &str, args: &[String]) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", cmd, args);

    let mut command = Command::new(cmd);
    command.args(args);
    command.stdin(Stdio::null());

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", cmd, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", cmd, e))
    })?;

    let pid = Pid::from_raw(child.id() as i32);
    debug!("Successfully spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

fn signal_group(pgid: Pid, signal: Signal) -> Result<()> {
    match killpg(pgid, signal) {
        Ok(()) => {
            debug!("Sent {} to process group {}", signal, pgid);
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", pgid);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, pgid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to process group {}: {}",
                signal, pgid, e
            )))
        }
    }
}

/// Send SIGTERM to a process group for graceful termination
///
/// `ESRCH` means the group is already gone and is treated as success.
pub fn signal_term_group(pgid: Pid) -> Result<()> {
    signal_group(pgid, Signal::SIGTERM)
}

/// Send SIGKILL to a process group for forceful termination
pub fn signal_kill_group(pgid: Pid) -> Result<()> {
    signal_group(pgid, Signal::SIGKILL)
}

/// Send SIGKILL to a single process discovered by pid
///
/// A process that vanished between discovery and termination (`ESRCH`) counts
/// as terminated. Permission errors are reported.
pub fn force_kill_pid(pid: u32) -> Result<()> {
    let target = Pid::from_raw(pid as i32);
    match kill(target, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process {} exited before termination", pid);
            Ok(())
        }
        Err(e) => Err(CoreError::ProcessSignal(format!(
            "Failed to send SIGKILL to process {}: {}",
            pid, e
        ))),
    }
}

/// Terminate with SIGTERM, escalating to SIGKILL after `timeout`
pub fn terminate_with_timeout(child: &mut ChildProcess, timeout: Duration) -> Result<ExitStatus> {
    signal_term_group(child.pgid())?;

    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some(status) = child.try_wait()? {
            debug!("Process {} exited gracefully with status: {}", child.pid, status);
            return Ok(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    warn!(
        "Process {} did not exit gracefully within {:?}, using SIGKILL",
        child.pid, timeout
    );
    signal_kill_group(child.pgid())?;

    let kill_timeout = Duration::from_secs(5);
    let kill_start = Instant::now();
    while kill_start.elapsed() < kill_timeout {
        if let Some(status) = child.try_wait()? {
            debug!("Process {} exited after SIGKILL with status: {}", child.pid, status);
            return Ok(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    Err(CoreError::ProcessWait(format!(
        "Process {} did not exit even after SIGKILL within {:?}",
        child.pid, kill_timeout
    )))
}
