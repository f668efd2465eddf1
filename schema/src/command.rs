//! Kill-switch command parsing
//!
//! The channel speaks one line of text per connection. Only the literal
//! `KILL` means anything; every other line is a well-formed no-op.

use std::fmt;

/// The only recognized command literal (case-sensitive)
pub const KILL_LITERAL: &str = "KILL";

/// Command parsed from a single line read off the kill-switch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillCommand {
    /// Terminate every process carrying the worker's image name
    Kill,
    /// Peer closed the connection without sending anything
    Empty,
    /// Any other line; ignored
    Unrecognized(String),
}

impl KillCommand {
    /// Parse one line. A single trailing `\n` or `\r\n` is stripped; nothing
    /// else is trimmed, so `" KILL"` and `"kill"` are not matches.
    pub fn parse(line: &str) -> Self {
        let line = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);
        if line == KILL_LITERAL {
            KillCommand::Kill
        } else if line.is_empty() {
            KillCommand::Empty
        } else {
            KillCommand::Unrecognized(line.to_string())
        }
    }

    /// Whether this command triggers termination
    pub fn is_kill(&self) -> bool {
        matches!(self, KillCommand::Kill)
    }
}

impl fmt::Display for KillCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillCommand::Kill => f.write_str(KILL_LITERAL),
            KillCommand::Empty => f.write_str("<empty>"),
            KillCommand::Unrecognized(line) => write!(f, "{line:?}"),
        }
    }
}
