use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected point-to-point link — implements Read + Write.
///
/// This is the fundamental I/O type returned by [`connect`](crate::connect).
/// Clones made with [`LinkStream::try_clone`] share the underlying socket, so
/// one half can read while the other writes, and [`LinkStream::shutdown`] on
/// any handle unblocks all of them.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(target_os = "linux")]
    Rfcomm(crate::rfcomm::RfcommStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => stream.flush(),
        }
    }
}

impl LinkStream {
    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            LinkStreamInner::Tcp(stream) => LinkStreamInner::Tcp(stream.try_clone()?),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => LinkStreamInner::Unix(stream.try_clone()?),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => LinkStreamInner::Rfcomm(stream.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Shut down both directions of the link.
    ///
    /// Blocked reads return EOF or an error and blocked writes fail, on this
    /// handle and on every clone of it. Shutting down an already closed link
    /// is not an error.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(stream) => stream.shutdown(),
        };
        match result {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Into::into),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
            #[cfg(target_os = "linux")]
            LinkStreamInner::Rfcomm(_) => "rfcomm",
        }
    }
}

impl From<TcpStream> for LinkStream {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for LinkStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }
}

#[cfg(target_os = "linux")]
impl From<crate::rfcomm::RfcommStream> for LinkStream {
    fn from(stream: crate::rfcomm::RfcommStream) -> Self {
        Self {
            inner: LinkStreamInner::Rfcomm(stream),
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
