//! Write-once shutdown flag shared between the controller and the listener
//!
//! The flag starts in the "run" position. [`ShutdownFlag::clear`] moves it to
//! "stop" exactly once and cancels the paired token, so tasks blocked in an
//! accept or read can be woken instead of waiting for the next loop check.
//! There is no way to re-arm it; a new start cycle creates a new flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

#[derive(Debug)]
struct Inner {
    running: AtomicBool,
    token: CancellationToken,
}

/// Shared run/stop flag with an attached cancellation token
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    inner: Arc<Inner>,
}

impl ShutdownFlag {
    /// Create a flag in the "run" position
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(true),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Whether the holder should keep running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Move the flag to "stop". Returns `true` only for the call that
    /// actually performed the transition.
    pub fn clear(&self) -> bool {
        let was_running = self.inner.running.swap(false, Ordering::AcqRel);
        self.inner.token.cancel();
        was_running
    }

    /// Resolves once the flag has been cleared
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Clone of the underlying cancellation token
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}
