//! Bluetooth RFCOMM stream sockets (Linux, BlueZ kernel API).

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

use crate::address::BdAddr;
use crate::socket::{self, RawAddr};

const AF_BLUETOOTH: libc::c_int = 31;
pub(crate) const BTPROTO_RFCOMM: libc::c_int = 3;

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`.
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

/// Kernel address of `device` on an RFCOMM channel.
pub(crate) fn sockaddr(device: BdAddr, channel: u8) -> RawAddr {
    RawAddr::from_sockaddr(SockaddrRc {
        rc_family: AF_BLUETOOTH as libc::sa_family_t,
        rc_bdaddr: device.to_le_bytes(),
        rc_channel: channel,
    })
}

/// A connected RFCOMM socket.
#[derive(Debug)]
pub struct RfcommStream {
    fd: OwnedFd,
}

impl From<OwnedFd> for RfcommStream {
    fn from(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl RfcommStream {
    /// Duplicate the descriptor; both handles refer to the same socket.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            fd: self.fd.try_clone()?,
        })
    }

    /// Shut down both directions, waking any thread blocked on the socket.
    pub fn shutdown(&self) -> io::Result<()> {
        socket::shutdown(&self.fd)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        socket::set_timeout(&self.fd, libc::SO_RCVTIMEO, timeout)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        socket::set_timeout(&self.fd, libc::SO_SNDTIMEO, timeout)
    }
}

impl Read for RfcommStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

impl Write for RfcommStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
        let n = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
