//! Test utilities for CLI crate integration tests.

#![allow(dead_code)]

use schema::ProcessHandle;
use std::sync::Mutex;
use std::time::Duration;
use warden_core::ProcessTable;

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Process table that pretends the named processes are running
#[derive(Debug, Default)]
pub struct FakeTable {
    pub processes: Vec<ProcessHandle>,
    pub terminated: Mutex<Vec<u32>>,
}

impl ProcessTable for FakeTable {
    fn find_by_name(&self, name: &str) -> warden_core::Result<Vec<ProcessHandle>> {
        Ok(self
            .processes
            .iter()
            .filter(|h| h.name == name)
            .cloned()
            .collect())
    }

    fn terminate(&self, handle: &ProcessHandle) -> warden_core::Result<()> {
        self.terminated.lock().unwrap().push(handle.pid);
        Ok(())
    }
}
