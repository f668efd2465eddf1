//! Host control events beyond start and stop
//!
//! The service advertises these capabilities to the host. None of them change
//! the service state; the controller only records that they arrived.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capabilities the service advertises to the host service manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Host may deliver pause and continue requests
    pub pause_continue: bool,
    /// Host may deliver power events
    pub power_events: bool,
    /// Host may deliver session-change events
    pub session_change: bool,
}

impl Capabilities {
    /// Everything the service accepts
    pub const ALL: Capabilities = Capabilities {
        pause_continue: true,
        power_events: true,
        session_change: true,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// Power status change delivered by the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PowerEvent {
    /// System is about to suspend
    Suspend,
    /// System resumed from suspend
    Resume,
    /// Power source changed (AC/battery)
    PowerStatusChange,
    /// Anything the host reports that has no dedicated variant
    Other(u32),
}

/// Interactive session change delivered by the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionChange {
    /// A user logged on
    Logon { session_id: u32 },
    /// A user logged off
    Logoff { session_id: u32 },
    /// Session locked
    Lock { session_id: u32 },
    /// Session unlocked
    Unlock { session_id: u32 },
    /// Anything the host reports that has no dedicated variant
    Other { reason: u32, session_id: u32 },
}

/// Non-lifecycle control request from the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    /// Pause request
    Pause,
    /// Continue request
    Continue,
    /// Power event
    Power { kind: PowerEvent },
    /// Session change
    Session { change: SessionChange },
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::Pause => f.write_str("pause"),
            HostEvent::Continue => f.write_str("continue"),
            HostEvent::Power { kind } => write!(f, "power event {kind:?}"),
            HostEvent::Session { change } => write!(f, "session change {change:?}"),
        }
    }
}
