//! wardend: the warden service binary
//!
//! Runs in the foreground under the host service manager. Host lifecycle
//! callbacks arrive as signals on Unix and as Ctrl+C elsewhere.

#![allow(unused_crate_dependencies)]

use clap::Parser;
use daemon::ServiceController;
use std::path::PathBuf;
use tracing::{error, info};
use warden_core::config::resolve_service_config;
use warden_core::utils::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "wardend", version, about = "Worker supervisor with a local kill switch")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Arguments passed to the worker on start
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    worker_args: Vec<String>,
}

#[tokio::main]
async fn main() -> daemon::Result<()> {
    let args = Args::parse();
    let config = resolve_service_config(args.config.as_deref())?;

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("wardend: tracing unavailable: {}", e);
    }
    info!("Starting {}", config.service_name);

    let mut controller = ServiceController::from_config(config);
    let outcome = controller
        .run_until_stopped(args.worker_args, |controller| Box::pin(wait_for_stop(controller)))
        .await;

    match &outcome {
        Ok(()) => info!("Service stopped"),
        Err(e) => error!("Service ended with an error: {}", e),
    }
    outcome
}

/// Dispatch host events until a stop is requested
#[cfg(unix)]
async fn wait_for_stop(controller: &ServiceController) -> daemon::Result<()> {
    use nix::libc;
    use schema::{HostEvent, PowerEvent, SessionChange};
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut pause = signal(SignalKind::from_raw(libc::SIGTSTP))?;
    let mut resume = signal(SignalKind::from_raw(libc::SIGCONT))?;
    #[cfg(target_os = "linux")]
    let mut power = signal(SignalKind::from_raw(libc::SIGPWR))?;

    loop {
        #[cfg(target_os = "linux")]
        let power_event = power.recv();
        #[cfg(not(target_os = "linux"))]
        let power_event = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = terminate.recv() => {
                info!("SIGTERM received");
                return Ok(());
            }
            _ = interrupt.recv() => {
                info!("SIGINT received");
                return Ok(());
            }
            _ = pause.recv() => controller.handle_host_event(HostEvent::Pause),
            _ = resume.recv() => controller.handle_host_event(HostEvent::Continue),
            _ = hangup.recv() => controller.handle_host_event(HostEvent::Session {
                change: SessionChange::Other { reason: libc::SIGHUP as u32, session_id: 0 },
            }),
            _ = power_event => controller.handle_host_event(HostEvent::Power {
                kind: PowerEvent::PowerStatusChange,
            }),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop(_controller: &ServiceController) -> daemon::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received");
    Ok(())
}
