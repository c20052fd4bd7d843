use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(target_os = "linux")]
use std::os::fd::OwnedFd;

/// Aborts a [`connect_cancellable`](crate::connect_cancellable) call from
/// another thread.
///
/// On Linux the socket being connected is registered here before the
/// blocking connect starts, and [`cancel`](ConnectCanceller::cancel) shuts
/// it down, which fails the pending connect immediately. Elsewhere a
/// cancelled attempt is only discarded once the platform call returns.
#[derive(Debug, Clone, Default)]
pub struct ConnectCanceller {
    inner: Arc<Mutex<Pending>>,
}

#[derive(Debug, Default)]
struct Pending {
    cancelled: bool,
    #[cfg(target_os = "linux")]
    socket: Option<OwnedFd>,
}

impl ConnectCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`cancel`](ConnectCanceller::cancel) interrupts a connect
    /// that is already blocked in the kernel on this platform.
    pub const fn interrupts_pending_connect() -> bool {
        cfg!(target_os = "linux")
    }

    /// Cancel the attempt. Later attempts made with this handle fail at once.
    pub fn cancel(&self) {
        let mut pending = self.inner.lock();
        pending.cancelled = true;
        #[cfg(target_os = "linux")]
        {
            if let Some(socket) = pending.socket.take() {
                if let Err(err) = crate::socket::shutdown(&socket) {
                    tracing::debug!(error = %err, "pending connect shutdown failed");
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Keep a duplicate of `socket` so `cancel` can shut it down while the
    /// owner is blocked connecting it.
    #[cfg(target_os = "linux")]
    pub(crate) fn register(&self, socket: &OwnedFd) -> std::io::Result<()> {
        let mut pending = self.inner.lock();
        if pending.cancelled {
            return Err(cancelled());
        }
        pending.socket = Some(socket.try_clone()?);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn release(&self) {
        self.inner.lock().socket = None;
    }
}

#[cfg(target_os = "linux")]
pub(crate) fn cancelled() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "connect cancelled")
}
