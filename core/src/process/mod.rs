//! Process management for the warden core library
//!
//! Two concerns live here:
//!
//! - **Discovery and termination by name** ([`ProcessTable`]): the kill
//!   switch enumerates live OS processes whose image name matches the worker
//!   and terminates each one. Nothing is cached between commands.
//! - **Worker child processes** (Unix, [`unix`]): spawning the worker
//!   executable in its own process group and signalling that group.
//!
//! ## Platform Support
//!
//! - **Unix**: enumeration through `sysinfo`, termination with `SIGKILL`
//! - **Windows**: enumeration and termination through `sysinfo`

mod table;

#[cfg(unix)]
pub mod unix;

pub use table::{image_name_matches, ProcessTable, SystemProcessTable};
