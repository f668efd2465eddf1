//! Live process enumeration and forced termination

use crate::{CoreError, Result};
use schema::ProcessHandle;
use std::ffi::OsStr;
use std::path::Path;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

/// OS process table as seen by the kill switch
///
/// Implementations must not cache: every call reflects the processes alive
/// at that moment.
pub trait ProcessTable: Send + Sync + std::fmt::Debug {
    /// All live processes whose image name matches `name`, excluding the
    /// calling process itself
    fn find_by_name(&self, name: &str) -> Result<Vec<ProcessHandle>>;

    /// Forcefully terminate one discovered process. A process that already
    /// exited counts as terminated.
    fn terminate(&self, handle: &ProcessHandle) -> Result<()>;
}

/// Whether a process with image `image` (and optional executable path `exe`)
/// is an instance of `target`
///
/// The image name is compared with any `.exe` suffix removed. Linux truncates
/// `comm` to 15 bytes, so the executable's file stem is checked as well.
pub fn image_name_matches(image: &OsStr, exe: Option<&Path>, target: &str) -> bool {
    if target.is_empty() {
        return false;
    }

    let image = image.to_string_lossy();
    let image = strip_exe_suffix(&image);
    if names_equal(image, target) {
        return true;
    }

    exe.and_then(Path::file_stem)
        .map(|stem| names_equal(&stem.to_string_lossy(), target))
        .unwrap_or(false)
}

fn strip_exe_suffix(name: &str) -> &str {
    match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".exe") => {
            &name[..cut]
        }
        _ => name,
    }
}

#[cfg(windows)]
fn names_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(not(windows))]
fn names_equal(a: &str, b: &str) -> bool {
    a == b
}

/// [`ProcessTable`] backed by the host OS
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SystemProcessTable {
    fn find_by_name(&self, name: &str) -> Result<Vec<ProcessHandle>> {
        let mut system = System::new();
        let refreshed = system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );
        if refreshed == 0 {
            return Err(CoreError::ProcessEnumeration(
                "process table is empty or unreadable".to_string(),
            ));
        }

        let own_pid = std::process::id();
        let mut matches: Vec<ProcessHandle> = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .filter(|(_, process)| image_name_matches(process.name(), process.exe(), name))
            .map(|(pid, process)| ProcessHandle {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
            })
            .collect();
        matches.sort_by_key(|handle| handle.pid);

        debug!("Found {} process(es) matching '{}'", matches.len(), name);
        Ok(matches)
    }

    #[cfg(unix)]
    fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        super::unix::force_kill_pid(handle.pid)
    }

    #[cfg(not(unix))]
    fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        let pid = sysinfo::Pid::from_u32(handle.pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match system.process(pid) {
            None => {
                debug!("Process {} exited before termination", handle);
                Ok(())
            }
            Some(process) if process.kill() => Ok(()),
            Some(_) => Err(CoreError::ProcessSignal(format!(
                "Failed to terminate {}",
                handle
            ))),
        }
    }
}
