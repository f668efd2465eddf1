//! Test utilities for integration tests in the daemon crate.

#![allow(dead_code)]

use daemon::{NullNotifier, ServiceController};
use schema::{ProcessHandle, ServiceConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use warden_core::{
    CoreError, DiagnosticsLog, ExitHandle, NullSink, ProcessTable, Worker, WorkerFactory,
};

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Poll `check` until it holds or `duration` elapses
pub async fn eventually(duration: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// How a [`PumpFactory`] worker behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerBehavior {
    /// Pump returns when exit is requested
    Cooperative,
    /// Construction fails
    FailsToConstruct,
    /// Pump ignores exit requests
    Unresponsive,
}

/// Worker factory whose workers pump an in-process channel
#[derive(Debug)]
pub struct PumpFactory {
    pub behavior: WorkerBehavior,
    pub constructed: AtomicUsize,
    pub disposed: Arc<AtomicUsize>,
    pub last_args: Mutex<Vec<String>>,
}

impl PumpFactory {
    pub fn new(behavior: WorkerBehavior) -> Self {
        Self {
            behavior,
            constructed: AtomicUsize::new(0),
            disposed: Arc::new(AtomicUsize::new(0)),
            last_args: Mutex::new(Vec::new()),
        }
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

struct PumpWorker {
    rx: mpsc::Receiver<()>,
    exit: Arc<PumpExit>,
    disposed: Arc<AtomicUsize>,
}

struct PumpExit {
    tx: Mutex<mpsc::Sender<()>>,
    ignore: bool,
}

impl ExitHandle for PumpExit {
    fn request_exit(&self) -> warden_core::Result<()> {
        if !self.ignore {
            let _ = self.tx.lock().unwrap().send(());
        }
        Ok(())
    }
}

impl Worker for PumpWorker {
    fn run(&mut self) -> warden_core::Result<()> {
        let _ = self.rx.recv();
        Ok(())
    }

    fn exit_handle(&self) -> Arc<dyn ExitHandle> {
        self.exit.clone()
    }

    fn dispose(self: Box<Self>) -> warden_core::Result<()> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl WorkerFactory for PumpFactory {
    fn construct(&self, args: &[String]) -> warden_core::Result<Box<dyn Worker>> {
        *self.last_args.lock().unwrap() = args.to_vec();
        if self.behavior == WorkerBehavior::FailsToConstruct {
            return Err(CoreError::WorkerError(
                "worker window could not be created".to_string(),
            ));
        }
        self.constructed.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        Ok(Box::new(PumpWorker {
            rx,
            exit: Arc::new(PumpExit {
                tx: Mutex::new(tx),
                ignore: self.behavior == WorkerBehavior::Unresponsive,
            }),
            disposed: self.disposed.clone(),
        }))
    }
}

/// Process table that records termination attempts
#[derive(Debug, Default)]
pub struct RecordingTable {
    pub processes: Vec<ProcessHandle>,
    pub terminated: Mutex<Vec<u32>>,
}

impl ProcessTable for RecordingTable {
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

/// A controller rooted in a temp directory
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: ServiceConfig,
    pub factory: Arc<PumpFactory>,
    pub table: Arc<RecordingTable>,
    pub controller: ServiceController,
}

impl Fixture {
    pub fn new(behavior: WorkerBehavior) -> Self {
        Self::with(behavior, RecordingTable::default(), |_| {})
    }

    pub fn with(
        behavior: WorkerBehavior,
        table: RecordingTable,
        tweak: impl FnOnce(&mut ServiceConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig {
            socket_path: dir.path().join("kill.sock"),
            log_file: dir.path().join("logs").join("service.log"),
            backoff_millis: 50,
            stop_timeout_secs: 5,
            worker_exit_timeout_secs: 2,
            ..ServiceConfig::default()
        };
        tweak(&mut config);

        let factory = Arc::new(PumpFactory::new(behavior));
        let table = Arc::new(table);
        let diagnostics = Arc::new(DiagnosticsLog::new(&config.log_file, Box::new(NullSink)));
        let controller = ServiceController::new(
            config.clone(),
            diagnostics,
            factory.clone(),
            table.clone(),
            Arc::new(NullNotifier),
        );
        Self {
            dir,
            config,
            factory,
            table,
            controller,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path.clone()
    }

    pub fn log(&self) -> String {
        std::fs::read_to_string(&self.config.log_file).unwrap_or_default()
    }
}
