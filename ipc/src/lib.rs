//! IPC (Inter-Process Communication) module
//!
//! This crate implements the kill-switch channel: a single named local
//! endpoint through which a local peer can ask the service to terminate every
//! process named like the worker. The wire format is one line of text; the
//! only recognized line is `KILL`, and nothing is ever sent back.

pub mod client;
pub mod error;
pub mod server;


pub use client::KillSwitchClient;
pub use error::{IpcError, Result};
pub use server::{
    read_command_line, terminate_matching, KillSwitchConfig, KillSwitchListener, ListenerStats,
    ListenerStatsSnapshot, TerminationReport, MAX_LINE_BYTES,
};
