use super::*;
use crate::logging::{DiagnosticsLog, NullSink};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use tempfile::TempDir;

/// Worker whose pump is a channel receive loop
struct PumpWorker {
    rx: mpsc::Receiver<()>,
    exit: Arc<PumpExit>,
    events: Arc<Events>,
    panic_in_run: bool,
    fail_dispose: bool,
}

struct PumpExit {
    tx: Mutex<mpsc::Sender<()>>,
    ignore: bool,
}

impl ExitHandle for PumpExit {
    fn request_exit(&self) -> Result<()> {
        if !self.ignore {
            let _ = self.tx.lock().unwrap().send(());
        }
        Ok(())
    }
}

impl Worker for PumpWorker {
    fn run(&mut self) -> Result<()> {
        self.events.runs.fetch_add(1, Ordering::SeqCst);
        if self.panic_in_run {
            panic!("pump exploded");
        }
        let _ = self.rx.recv();
        Ok(())
    }

    fn exit_handle(&self) -> Arc<dyn ExitHandle> {
        self.exit.clone()
    }

    fn dispose(self: Box<Self>) -> Result<()> {
        self.events.disposed.store(true, Ordering::SeqCst);
        if self.fail_dispose {
            return Err(CoreError::WorkerError("handle leak".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Events {
    runs: AtomicUsize,
    disposed: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Normal,
    ConstructError,
    ConstructPanic,
    RunPanic,
    DisposeError,
    IgnoreExit,
    SlowConstruct,
}

#[derive(Debug)]
struct TestFactory {
    mode: Mode,
    events: Arc<Events>,
}

impl WorkerFactory for TestFactory {
    fn construct(&self, _args: &[String]) -> Result<Box<dyn Worker>> {
        match self.mode {
            Mode::ConstructError => {
                return Err(CoreError::WorkerError("window class missing".to_string()))
            }
            Mode::ConstructPanic => panic!("constructor exploded"),
            Mode::SlowConstruct => std::thread::sleep(Duration::from_millis(150)),
            _ => {}
        }
        let (tx, rx) = mpsc::channel();
        Ok(Box::new(PumpWorker {
            rx,
            exit: Arc::new(PumpExit {
                tx: Mutex::new(tx),
                ignore: self.mode == Mode::IgnoreExit,
            }),
            events: self.events.clone(),
            panic_in_run: self.mode == Mode::RunPanic,
            fail_dispose: self.mode == Mode::DisposeError,
        }))
    }
}

struct Harness {
    _temp: TempDir,
    log: Arc<DiagnosticsLog>,
    events: Arc<Events>,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let log = Arc::new(DiagnosticsLog::new(
            temp.path().join("service.log"),
            Box::new(NullSink),
        ));
        Self {
            _temp: temp,
            log,
            events: Arc::new(Events::default()),
        }
    }

    fn launch(&self, mode: Mode, exit_timeout: Duration) -> WorkerSupervisor {
        let factory = Arc::new(TestFactory {
            mode,
            events: self.events.clone(),
        });
        WorkerSupervisor::launch(factory, self.log.clone(), Vec::new(), exit_timeout).unwrap()
    }

    fn contents(&self) -> String {
        std::fs::read_to_string(self.log.path()).unwrap_or_default()
    }

    fn wait_for(&self, needle: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.contents().contains(needle) {
            assert!(Instant::now() < deadline, "log never contained {needle:?}");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

#[test]
fn test_launch_and_shutdown() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::Normal, Duration::from_secs(2));
    harness.wait_for("Worker running");
    assert!(supervisor.is_alive());

    assert!(supervisor.shutdown());
    assert!(harness.events.disposed.load(Ordering::SeqCst));
    let log = harness.contents();
    assert!(log.contains("Worker message pump exited"));
    assert!(log.contains("Worker disposed"));
}

#[test]
fn test_worker_runs_on_named_thread() {
    #[derive(Debug)]
    struct NameProbe(Arc<Mutex<Option<String>>>);

    impl WorkerFactory for NameProbe {
        fn construct(&self, _args: &[String]) -> Result<Box<dyn Worker>> {
            *self.0.lock().unwrap() = std::thread::current().name().map(str::to_string);
            Err(CoreError::WorkerError("probe only".to_string()))
        }
    }

    let harness = Harness::new();
    let seen = Arc::new(Mutex::new(None));
    let supervisor = WorkerSupervisor::launch(
        Arc::new(NameProbe(seen.clone())),
        harness.log.clone(),
        Vec::new(),
        Duration::from_secs(1),
    )
    .unwrap();
    assert!(supervisor.shutdown());
    assert_eq!(seen.lock().unwrap().as_deref(), Some(WORKER_THREAD_NAME));
}

#[test]
fn test_construction_error_is_logged() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::ConstructError, Duration::from_secs(1));
    harness.wait_for("StartupFailure");

    assert!(supervisor.shutdown());
    let log = harness.contents();
    assert!(log.contains("StartupFailure: worker construction failed: [CORE004]"));
    assert!(log.contains("window class missing"));
    assert_eq!(harness.events.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_construction_panic_is_contained() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::ConstructPanic, Duration::from_secs(1));
    harness.wait_for("StartupFailure: worker construction panicked: constructor exploded");
    assert!(supervisor.shutdown());
}

#[test]
fn test_pump_panic_still_disposes() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::RunPanic, Duration::from_secs(1));
    harness.wait_for("Worker disposed");

    assert!(harness.contents().contains("Worker message pump panicked: pump exploded"));
    assert!(harness.events.disposed.load(Ordering::SeqCst));
    assert!(supervisor.shutdown());
}

#[test]
fn test_dispose_error_is_logged_not_raised() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::DisposeError, Duration::from_secs(1));
    harness.wait_for("Worker running");

    assert!(supervisor.shutdown());
    assert!(harness
        .contents()
        .contains("TeardownFailure: worker dispose failed: [CORE004] Worker error: handle leak"));
}

#[test]
fn test_unresponsive_worker_is_detached() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::IgnoreExit, Duration::from_millis(100));
    harness.wait_for("Worker running");

    let started = Instant::now();
    assert!(!supervisor.shutdown());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(harness.contents().contains("detaching worker thread"));
}

#[test]
fn test_exit_requested_during_construction() {
    let harness = Harness::new();
    let supervisor = harness.launch(Mode::SlowConstruct, Duration::from_secs(2));

    // Shutdown lands before the worker exists; the pump must still return
    assert!(supervisor.shutdown());
    assert!(harness.events.disposed.load(Ordering::SeqCst));
}

#[test]
fn test_panic_message_variants() {
    let boxed: Box<dyn Any + Send> = Box::new("static str");
    assert_eq!(panic_message(boxed.as_ref()), "static str");
    let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
    assert_eq!(panic_message(boxed.as_ref()), "owned");
    let boxed: Box<dyn Any + Send> = Box::new(42u8);
    assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
}
