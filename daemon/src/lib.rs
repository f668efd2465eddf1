//! Daemon library for the warden service supervisor
//!
//! [`ServiceController`] is the lifecycle controller: it receives start and
//! stop from the host, launches the worker on its dedicated thread and the
//! kill-switch listener on the async runtime, and unwinds both on stop.
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//! ```
//!
//! Only a failure to bring up the subsystems makes `start` return an error;
//! a worker that fails to construct leaves the service Running without a
//! worker. `stop` never fails.

#![allow(unused_crate_dependencies)]

pub mod host;
pub mod simple_error;


pub use host::{HostNotifier, NullNotifier, SystemdNotifier};
pub use simple_error::{DaemonError, Result};

use ipc::{KillSwitchConfig, KillSwitchListener, ListenerStats};
use schema::{Capabilities, HostEvent, ServiceConfig, ServiceState};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warden_core::{
    CommandWorkerFactory, DiagnosticsLog, ProcessTable, ShutdownFlag, SystemProcessTable,
    WorkerFactory, WorkerSupervisor,
};

/// Background activity of one start/stop cycle
#[derive(Debug)]
struct ActiveRun {
    shutdown: ShutdownFlag,
    worker: WorkerSupervisor,
    listener: JoinHandle<()>,
    listener_stats: Arc<ListenerStats>,
}

/// Lifecycle controller between the host and the supervised subsystems
#[derive(Debug)]
pub struct ServiceController {
    config: ServiceConfig,
    diagnostics: Arc<DiagnosticsLog>,
    factory: Arc<dyn WorkerFactory>,
    table: Arc<dyn ProcessTable>,
    notifier: Arc<dyn HostNotifier>,
    state: ServiceState,
    active: Option<ActiveRun>,
}

impl ServiceController {
    /// Create a controller with explicit collaborators
    pub fn new(
        config: ServiceConfig,
        diagnostics: Arc<DiagnosticsLog>,
        factory: Arc<dyn WorkerFactory>,
        table: Arc<dyn ProcessTable>,
        notifier: Arc<dyn HostNotifier>,
    ) -> Self {
        Self {
            config,
            diagnostics,
            factory,
            table,
            notifier,
            state: ServiceState::Stopped,
            active: None,
        }
    }

    /// Create a controller wired to the real OS: command-backed worker,
    /// system process table, system log fallback and systemd notifications
    pub fn from_config(config: ServiceConfig) -> Self {
        let diagnostics = Arc::new(DiagnosticsLog::for_service(
            config.log_file.clone(),
            &config.service_name,
        ));
        let factory = Arc::new(CommandWorkerFactory::from_config(&config));
        Self::new(
            config,
            diagnostics,
            factory,
            Arc::new(SystemProcessTable::new()),
            Arc::new(SystemdNotifier::from_env()),
        )
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Capabilities advertised to the host
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    /// Shared diagnostics log
    pub fn diagnostics(&self) -> Arc<DiagnosticsLog> {
        self.diagnostics.clone()
    }

    /// Whether the kill-switch listener task is still running
    pub fn listener_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| !run.listener.is_finished())
    }

    /// Whether the worker thread is still running
    pub fn worker_alive(&self) -> bool {
        self.active.as_ref().is_some_and(|run| run.worker.is_alive())
    }

    /// Counters of the current listener, if started
    pub fn listener_stats(&self) -> Option<Arc<ListenerStats>> {
        self.active.as_ref().map(|run| run.listener_stats.clone())
    }

    /// Handle the host's start request
    ///
    /// Starting a service that is not stopped is a logged no-op.
    pub async fn start(&mut self, args: Vec<String>) -> Result<()> {
        if self.state != ServiceState::Stopped {
            warn!("Start requested while {}; ignoring", self.state);
            self.diagnostics.log(format!(
                "Start requested while {}; no action taken",
                self.state
            ));
            return Ok(());
        }

        self.state = ServiceState::Starting;
        self.diagnostics.log(format!(
            "{} starting (pid {}, args {:?})",
            self.config.service_name,
            std::process::id(),
            args
        ));
        self.notifier.extend_startup(self.config.startup_extension());

        match self.launch(args) {
            Ok(run) => {
                self.active = Some(run);
                self.state = ServiceState::Running;
                self.notifier.ready();
                self.diagnostics
                    .log(format!("{} running", self.config.service_name));
                Ok(())
            }
            Err(e) => {
                self.state = ServiceState::Stopped;
                self.diagnostics
                    .log(format!("FatalStartupFailure: [{}] {}", e.code(), e));
                Err(e)
            }
        }
    }

    fn launch(&self, args: Vec<String>) -> Result<ActiveRun> {
        let shutdown = ShutdownFlag::new();

        let worker = WorkerSupervisor::launch(
            self.factory.clone(),
            self.diagnostics.clone(),
            args,
            self.config.worker_exit_timeout(),
        )
        .map_err(|e| {
            DaemonError::StartupError(format!("worker thread: [{}] {}", e.code(), e))
        })?;

        let listener = KillSwitchListener::new(
            KillSwitchConfig::from_service_config(&self.config),
            self.table.clone(),
            self.diagnostics.clone(),
            shutdown.clone(),
        );
        let listener_stats = listener.stats();
        let listener = tokio::spawn(listener.run());

        Ok(ActiveRun {
            shutdown,
            worker,
            listener,
            listener_stats,
        })
    }

    /// Handle the host's stop request. Never fails; teardown problems are
    /// logged.
    pub async fn stop(&mut self) {
        let Some(run) = self.active.take() else {
            info!("Stop requested while {}; nothing to do", self.state);
            self.state = ServiceState::Stopped;
            return;
        };

        let started = Instant::now();
        self.state = ServiceState::Stopping;
        self.notifier.stopping();
        self.diagnostics
            .log(format!("{} stopping", self.config.service_name));

        run.shutdown.clear();

        let ActiveRun {
            worker,
            mut listener,
            ..
        } = run;
        let budget = self.config.stop_timeout();
        let diagnostics = self.diagnostics.clone();

        let worker_teardown = async {
            match tokio::task::spawn_blocking(move || worker.shutdown()).await {
                Ok(_) => {}
                Err(e) => diagnostics.log(format!("TeardownFailure: worker shutdown task: {}", e)),
            }
        };

        let listener_teardown = async {
            match tokio::time::timeout(budget, &mut listener).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self
                    .diagnostics
                    .log(format!("TeardownFailure: kill-switch listener: {}", e)),
                Err(_) => {
                    self.diagnostics.log(format!(
                        "TeardownFailure: kill-switch listener did not stop within {:?}",
                        budget
                    ));
                    listener.abort();
                }
            }
        };

        tokio::join!(worker_teardown, listener_teardown);

        self.state = ServiceState::Stopped;
        self.diagnostics.log(format!(
            "{} stopped in {} ms",
            self.config.service_name,
            started.elapsed().as_millis()
        ));
    }

    /// Start, wait for the host to ask for a stop, then stop
    ///
    /// `wait` receives the running controller so it can dispatch host events.
    /// The service is stopped even when `wait` fails; its error is returned
    /// afterwards.
    pub async fn run_until_stopped<F>(&mut self, args: Vec<String>, wait: F) -> Result<()>
    where
        F: for<'a> FnOnce(&'a ServiceController) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>>,
    {
        self.start(args).await?;

        let waited = wait(self).await;
        if let Err(e) = &waited {
            warn!("Waiting for stop failed: {}", e);
            self.diagnostics
                .log(format!("Host event dispatch failed: [{}] {}", e.code(), e));
        }

        self.stop().await;
        waited
    }

    /// Handle a host event the service advertises but does not act on
    pub fn handle_host_event(&self, event: HostEvent) {
        info!("Host event received: {}", event);
        self.diagnostics
            .log(format!("Host event {} received in state {}; no action taken", event, self.state));
    }
}

impl Drop for ServiceController {
    fn drop(&mut self) {
        if let Some(run) = &self.active {
            // The listener observes the cleared flag even without an awaited stop
            run.shutdown.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{PowerEvent, SessionChange};
    use std::sync::Mutex;
    use std::time::Duration;
    use warden_core::{CoreError, NullSink, Worker};

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl HostNotifier for RecordingNotifier {
        fn extend_startup(&self, extra: Duration) {
            self.messages
                .lock()
                .unwrap()
                .push(host::extend_timeout_message(extra));
        }
        fn ready(&self) {
            self.messages.lock().unwrap().push("READY=1".to_string());
        }
        fn stopping(&self) {
            self.messages.lock().unwrap().push("STOPPING=1".to_string());
        }
    }

    #[derive(Debug)]
    struct NoWorker;

    impl WorkerFactory for NoWorker {
        fn construct(&self, _args: &[String]) -> warden_core::Result<Box<dyn Worker>> {
            Err(CoreError::WorkerError("no display".to_string()))
        }
    }

    fn controller(notifier: Arc<RecordingNotifier>) -> (tempfile::TempDir, ServiceController) {
        let temp = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            socket_path: temp.path().join("kill.sock"),
            log_file: temp.path().join("service.log"),
            backoff_millis: 50,
            startup_extension_secs: 45,
            ..ServiceConfig::default()
        };
        let diagnostics = Arc::new(DiagnosticsLog::new(&config.log_file, Box::new(NullSink)));
        let controller = ServiceController::new(
            config,
            diagnostics,
            Arc::new(NoWorker),
            Arc::new(SystemProcessTable::new()),
            notifier,
        );
        (temp, controller)
    }

    #[tokio::test]
    async fn test_notifications_follow_lifecycle() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (_temp, mut controller) = controller(notifier.clone());
        assert_eq!(controller.state(), ServiceState::Stopped);

        controller.start(Vec::new()).await.unwrap();
        assert_eq!(controller.state(), ServiceState::Running);
        controller.stop().await;
        assert_eq!(controller.state(), ServiceState::Stopped);

        assert_eq!(
            *notifier.messages.lock().unwrap(),
            vec!["EXTEND_TIMEOUT_USEC=45000000", "READY=1", "STOPPING=1"]
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (_temp, mut controller) = controller(notifier.clone());
        controller.start(Vec::new()).await.unwrap();
        controller.start(Vec::new()).await.unwrap();
        assert_eq!(notifier.messages.lock().unwrap().len(), 2);
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (_temp, mut controller) = controller(notifier.clone());
        controller.stop().await;
        assert_eq!(controller.state(), ServiceState::Stopped);
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_host_events_are_logged_no_ops() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (_temp, mut controller) = controller(notifier);
        controller.start(Vec::new()).await.unwrap();

        let caps = controller.capabilities();
        assert!(caps.pause_continue && caps.power_events && caps.session_change);

        controller.handle_host_event(HostEvent::Pause);
        controller.handle_host_event(HostEvent::Continue);
        controller.handle_host_event(HostEvent::Power {
            kind: PowerEvent::Suspend,
        });
        controller.handle_host_event(HostEvent::Session {
            change: SessionChange::Lock { session_id: 2 },
        });
        assert_eq!(controller.state(), ServiceState::Running);
        assert!(controller.listener_active());

        let log = std::fs::read_to_string(controller.diagnostics().path()).unwrap();
        assert!(log.contains("Host event pause received in state RUNNING; no action taken"));
        assert!(log.contains("Host event continue received"));
        controller.stop().await;
    }
}
