//! Diagnostics log: append-only, line-oriented event trail for post-mortem diagnosis
//!
//! Every record is one line, a locally formatted timestamp followed by the
//! message, appended to a fixed file. The containing directory is created on
//! first use. When the append fails the failure is handed to a
//! [`FallbackSink`] (the host's system log); if that fails too, it is dropped.
//! [`DiagnosticsLog::log`] never returns an error and never panics on I/O.
//!
//! There is no rotation and no size bound.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Timestamp layout used for every log line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single diagnostics record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Local wall-clock time the record was created
    pub timestamp: DateTime<Local>,
    /// Free-form message
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped with the current local time
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }

    /// Render as a single line including the trailing newline.
    /// Embedded line breaks are flattened so one record stays one line.
    pub fn to_line(&self) -> String {
        let message = self.message.replace(['\r', '\n'], " ");
        format!("{} {}\n", self.timestamp.format(TIMESTAMP_FORMAT), message)
    }
}

/// Secondary sink used when the primary log file cannot be written
pub trait FallbackSink: Send + Sync + std::fmt::Debug {
    /// Report a message at error severity
    fn report(&self, message: &str) -> io::Result<()>;
}

/// Fallback that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FallbackSink for NullSink {
    fn report(&self, _message: &str) -> io::Result<()> {
        Ok(())
    }
}

/// The platform's system log, identified by `source_name`
pub fn system_fallback(source_name: &str) -> Box<dyn FallbackSink> {
    #[cfg(unix)]
    {
        Box::new(sys::SyslogSink::new(source_name))
    }
    #[cfg(windows)]
    {
        Box::new(sys::EventLogSink::new(source_name))
    }
    #[cfg(all(not(unix), not(windows)))]
    {
        let _ = source_name;
        Box::new(NullSink)
    }
}

/// Append-only diagnostics log with a best-effort fallback
#[derive(Debug)]
pub struct DiagnosticsLog {
    path: PathBuf,
    fallback: Box<dyn FallbackSink>,
    dir_ready: AtomicBool,
}

impl DiagnosticsLog {
    /// Create a log writing to `path` with an explicit fallback sink
    pub fn new(path: impl Into<PathBuf>, fallback: Box<dyn FallbackSink>) -> Self {
        Self {
            path: path.into(),
            fallback,
            dir_ready: AtomicBool::new(false),
        }
    }

    /// Create a log writing to `path` that falls back to the system log
    /// under `source_name`
    pub fn for_service(path: impl Into<PathBuf>, source_name: &str) -> Self {
        Self::new(path, system_fallback(source_name))
    }

    /// Path of the primary log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a message. Never fails.
    pub fn log(&self, message: impl AsRef<str>) {
        let record = LogRecord::now(message.as_ref());
        info!(target: "diagnostics", "{}", record.message);

        if let Err(e) = self.append(&record) {
            let report = format!(
                "failed to write diagnostics log {}: {}; message: {}",
                self.path.display(),
                e,
                record.message
            );
            if let Err(fallback_err) = self.fallback.report(&report) {
                debug!("fallback log sink failed: {}", fallback_err);
            }
        }
    }

    fn append(&self, record: &LogRecord) -> io::Result<()> {
        if !self.dir_ready.load(Ordering::Acquire) {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            self.dir_ready.store(true, Ordering::Release);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // One write per record keeps concurrent appends line-atomic
        file.write_all(record.to_line().as_bytes())
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod sys {
    use super::FallbackSink;
    use std::ffi::CString;
    use std::io;
    use std::sync::Mutex;

    /// Writes to syslog with `LOG_ERR` priority under a fixed identity
    #[derive(Debug)]
    pub struct SyslogSink {
        ident: CString,
        lock: Mutex<()>,
    }

    impl SyslogSink {
        pub fn new(source_name: &str) -> Self {
            let ident = CString::new(source_name.replace('\0', ""))
                .unwrap_or_else(|_| CString::from(c"warden"));
            Self {
                ident,
                lock: Mutex::new(()),
            }
        }
    }

    impl FallbackSink for SyslogSink {
        fn report(&self, message: &str) -> io::Result<()> {
            let msg = CString::new(message.replace('\0', " "))
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
            // SAFETY: `ident` and `msg` are valid NUL-terminated strings that
            // outlive the openlog/closelog pair, and the format string takes
            // exactly one `%s` argument.
            unsafe {
                libc::openlog(self.ident.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON);
                libc::syslog(libc::LOG_ERR, c"%s".as_ptr(), msg.as_ptr());
                libc::closelog();
            }
            Ok(())
        }
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod sys {
    use super::FallbackSink;
    use std::io;
    use windows_sys::Win32::System::EventLog::{
        DeregisterEventSource, RegisterEventSourceW, ReportEventW, EVENTLOG_ERROR_TYPE,
    };

    /// Writes to the Windows Application event log with error severity
    #[derive(Debug)]
    pub struct EventLogSink {
        source: Vec<u16>,
    }

    impl EventLogSink {
        pub fn new(source_name: &str) -> Self {
            Self {
                source: to_wide(source_name),
            }
        }
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    impl FallbackSink for EventLogSink {
        fn report(&self, message: &str) -> io::Result<()> {
            let text = to_wide(message);
            let strings = [text.as_ptr()];
            // SAFETY: all pointers reference live, NUL-terminated UTF-16
            // buffers owned by this frame; the handle is released before return.
            unsafe {
                let handle = RegisterEventSourceW(std::ptr::null(), self.source.as_ptr());
                if handle.is_null() {
                    return Err(io::Error::last_os_error());
                }
                let ok = ReportEventW(
                    handle,
                    EVENTLOG_ERROR_TYPE,
                    0,
                    0,
                    std::ptr::null_mut(),
                    1,
                    0,
                    strings.as_ptr(),
                    std::ptr::null(),
                );
                let report_err = io::Error::last_os_error();
                DeregisterEventSource(handle);
                if ok == 0 {
                    return Err(report_err);
                }
            }
            Ok(())
        }
    }
}
