//! Schema definitions for warden
//!
//! Shared data structures used by the supervisor core, the kill-switch
//! channel, the daemon and the CLI.

pub mod command;
pub mod events;
pub mod service;

pub use command::{KillCommand, KILL_LITERAL};
pub use events::{Capabilities, HostEvent, PowerEvent, SessionChange};
pub use service::{
    ProcessHandle, ServiceConfig, ServiceState, DEFAULT_CHANNEL_NAME, DEFAULT_SERVICE_NAME,
    DEFAULT_WORKER_PROCESS_NAME,
};
