//! Test utilities for integration tests in the ipc crate.

#![allow(dead_code)]

use schema::ProcessHandle;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warden_core::{CoreError, DiagnosticsLog, NullSink, ProcessTable};

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Process table with a fixed set of processes and scripted failures
#[derive(Debug, Default)]
pub struct ScriptedTable {
    pub processes: Vec<ProcessHandle>,
    pub failing_pids: Vec<u32>,
    pub attempts: Mutex<Vec<u32>>,
    pub lookups: Mutex<Vec<String>>,
}

impl ScriptedTable {
    pub fn with_processes(name: &str, pids: &[u32]) -> Self {
        Self {
            processes: pids
                .iter()
                .map(|&pid| ProcessHandle {
                    pid,
                    name: name.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

impl ProcessTable for ScriptedTable {
    fn find_by_name(&self, name: &str) -> warden_core::Result<Vec<ProcessHandle>> {
        self.lookups.lock().unwrap().push(name.to_string());
        Ok(self
            .processes
            .iter()
            .filter(|h| h.name == name)
            .cloned()
            .collect())
    }

    fn terminate(&self, handle: &ProcessHandle) -> warden_core::Result<()> {
        self.attempts.lock().unwrap().push(handle.pid);
        if self.failing_pids.contains(&handle.pid) {
            return Err(CoreError::ProcessSignal(format!(
                "EPERM while signalling {}",
                handle.pid
            )));
        }
        Ok(())
    }
}

/// Diagnostics log in a temp directory plus a reader for its contents
pub struct TempLog {
    pub dir: tempfile::TempDir,
    pub log: Arc<DiagnosticsLog>,
}

impl TempLog {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(DiagnosticsLog::new(
            dir.path().join("logs").join("service.log"),
            Box::new(NullSink),
        ));
        Self { dir, log }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join("kill.sock")
    }

    pub fn contents(&self) -> String {
        read_or_empty(self.log.path())
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

fn read_or_empty(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
