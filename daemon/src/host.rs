//! Notifications to the host service manager
//!
//! On systemd hosts the service reports progress over the `$NOTIFY_SOCKET`
//! datagram socket (`Type=notify` units). Everywhere else the notifier is a
//! no-op. Notification failures never affect the service; they are logged
//! at debug level and dropped.

use std::time::Duration;

/// Progress reports sent to the host's service-control surface
pub trait HostNotifier: Send + Sync + std::fmt::Debug {
    /// Ask for more time before the host gives up on a pending start
    fn extend_startup(&self, extra: Duration);

    /// Startup finished
    fn ready(&self);

    /// Shutdown has begun
    fn stopping(&self);
}

/// Notifier that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl HostNotifier for NullNotifier {
    fn extend_startup(&self, _extra: Duration) {}
    fn ready(&self) {}
    fn stopping(&self) {}
}

/// `sd_notify` protocol message for a startup extension
pub fn extend_timeout_message(extra: Duration) -> String {
    format!("EXTEND_TIMEOUT_USEC={}", extra.as_micros())
}

/// systemd notification socket client
#[derive(Debug, Clone)]
pub struct SystemdNotifier {
    socket: Option<std::path::PathBuf>,
}

impl SystemdNotifier {
    /// Notifier for `$NOTIFY_SOCKET`; inert when the variable is unset
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("NOTIFY_SOCKET").map(std::path::PathBuf::from))
    }

    pub fn new(socket: Option<std::path::PathBuf>) -> Self {
        Self { socket }
    }

    /// Whether a notification socket is configured
    pub fn is_enabled(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&self, message: &str) {
        let Some(socket) = &self.socket else {
            return;
        };
        match send_datagram(socket, message) {
            Ok(()) => tracing::debug!("Sent host notification {:?}", message),
            Err(e) => tracing::debug!("Host notification {:?} failed: {}", message, e),
        }
    }
}

impl HostNotifier for SystemdNotifier {
    fn extend_startup(&self, extra: Duration) {
        self.send(&extend_timeout_message(extra));
    }

    fn ready(&self) {
        self.send("READY=1");
    }

    fn stopping(&self) {
        self.send("STOPPING=1");
    }
}

#[cfg(unix)]
fn send_datagram(socket: &std::path::Path, message: &str) -> std::io::Result<()> {
    use std::os::unix::net::UnixDatagram;

    let datagram = UnixDatagram::unbound()?;

    #[cfg(target_os = "linux")]
    {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::ffi::OsStrExt;
        use std::os::unix::net::SocketAddr;

        // A leading '@' names a socket in the abstract namespace
        let raw = socket.as_os_str().as_bytes();
        if let Some(name) = raw.strip_prefix(b"@") {
            let addr = SocketAddr::from_abstract_name(name)?;
            datagram.send_to_addr(message.as_bytes(), &addr)?;
            return Ok(());
        }
    }

    datagram.send_to(message.as_bytes(), socket)?;
    Ok(())
}

#[cfg(not(unix))]
fn send_datagram(_socket: &std::path::Path, _message: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "sd_notify requires Unix datagram sockets",
    ))
}
