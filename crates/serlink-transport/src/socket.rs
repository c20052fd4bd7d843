//! Blocking stream-socket connects through libc.
//!
//! The socket is created before the connect call blocks, so it can be
//! registered with a [`ConnectCanceller`] and shut down from another thread.
//! Linux applies `SO_SNDTIMEO` to a blocking connect, which bounds every
//! link kind with the same timeout.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use crate::cancel::{cancelled, ConnectCanceller};

/// A socket address in the kernel's generic representation.
pub(crate) struct RawAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl RawAddr {
    /// Wrap a concrete kernel `sockaddr_*` value.
    pub(crate) fn from_sockaddr<T>(addr: T) -> Self {
        debug_assert!(mem::size_of::<T>() <= mem::size_of::<libc::sockaddr_storage>());
        // SAFETY: all-zero bytes are a valid sockaddr_storage.
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        // SAFETY: `T` is a sockaddr type no larger than sockaddr_storage, which
        // is aligned for every socket address type.
        unsafe {
            std::ptr::write(
                (&mut storage as *mut libc::sockaddr_storage).cast::<T>(),
                addr,
            )
        };
        Self {
            storage,
            len: mem::size_of::<T>() as libc::socklen_t,
        }
    }

    pub(crate) fn inet(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => {
                // SAFETY: all-zero bytes are a valid sockaddr_in.
                let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
                Self::from_sockaddr(sin)
            }
            SocketAddr::V6(v6) => {
                // SAFETY: all-zero bytes are a valid sockaddr_in6.
                let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_flowinfo = v6.flowinfo();
                sin6.sin6_addr.s6_addr = v6.ip().octets();
                sin6.sin6_scope_id = v6.scope_id();
                Self::from_sockaddr(sin6)
            }
        }
    }

    pub(crate) fn unix(path: &Path) -> io::Result<Self> {
        // SAFETY: all-zero bytes are a valid sockaddr_un.
        let mut sun: libc::sockaddr_un = unsafe { mem::zeroed() };
        sun.sun_family = libc::AF_UNIX as libc::sa_family_t;

        let bytes = path.as_os_str().as_bytes();
        if bytes.contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "socket path contains a NUL byte",
            ));
        }
        // Leave room for the terminating NUL.
        if bytes.len() >= sun.sun_path.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "socket path is too long",
            ));
        }
        for (dst, &src) in sun.sun_path.iter_mut().zip(bytes) {
            *dst = src as libc::c_char;
        }
        Ok(Self::from_sockaddr(sun))
    }

    fn family(&self) -> libc::c_int {
        libc::c_int::from(self.storage.ss_family)
    }
}

/// Open a stream socket for `addr` and connect it, blocking for at most
/// `timeout`. Fails with `ConnectionAborted` once `canceller` is cancelled.
pub(crate) fn connect(
    addr: &RawAddr,
    protocol: libc::c_int,
    timeout: Option<Duration>,
    canceller: &ConnectCanceller,
) -> io::Result<OwnedFd> {
    let socket = open(addr.family(), protocol)?;
    set_timeout(&socket, libc::SO_SNDTIMEO, timeout)?;

    canceller.register(&socket)?;
    let result = connect_raw(&socket, addr);
    canceller.release();
    if canceller.is_cancelled() {
        return Err(cancelled());
    }
    result?;

    set_timeout(&socket, libc::SO_SNDTIMEO, None)?;
    Ok(socket)
}

fn open(family: libc::c_int, protocol: libc::c_int) -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the returned descriptor is checked before use.
    let raw = unsafe { libc::socket(family, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, protocol) };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

fn connect_raw(socket: &OwnedFd, addr: &RawAddr) -> io::Result<()> {
    loop {
        // SAFETY: `addr.storage` holds a valid address of `addr.len` bytes and
        // outlives the call; `socket` is open.
        let rc = unsafe {
            libc::connect(
                socket.as_raw_fd(),
                (&addr.storage as *const libc::sockaddr_storage).cast::<libc::sockaddr>(),
                addr.len,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EISCONN) => return Ok(()),
            // A blocking connect that ran out of SO_SNDTIMEO.
            Some(libc::EINPROGRESS) => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
            }
            _ => return Err(err),
        }
    }
}

/// Shut down both directions, waking any thread blocked on the socket,
/// including one still connecting it.
pub(crate) fn shutdown(socket: &impl AsRawFd) -> io::Result<()> {
    // SAFETY: `socket` is an open descriptor for the duration of the call.
    let rc = unsafe { libc::shutdown(socket.as_raw_fd(), libc::SHUT_RDWR) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Set `SO_RCVTIMEO` or `SO_SNDTIMEO`. `None` blocks indefinitely.
pub(crate) fn set_timeout(
    socket: &impl AsRawFd,
    option: libc::c_int,
    timeout: Option<Duration>,
) -> io::Result<()> {
    let tv = match timeout {
        Some(d) if d.is_zero() => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot set a zero duration timeout",
            ));
        }
        Some(d) => libc::timeval {
            tv_sec: d.as_secs() as libc::time_t,
            tv_usec: d.subsec_micros() as libc::suseconds_t,
        },
        None => libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };

    // SAFETY: `tv` is a valid timeval for the length passed; `socket` is open.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            (&tv as *const libc::timeval).cast::<libc::c_void>(),
            mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv6Addr, SocketAddrV6};

    use super::*;

    #[test]
    fn inet_addresses_carry_family_and_length() {
        let v4 = RawAddr::inet(&"127.0.0.1:7000".parse().unwrap());
        assert_eq!(v4.family(), libc::AF_INET);
        assert_eq!(v4.len as usize, mem::size_of::<libc::sockaddr_in>());

        let v6 = RawAddr::inet(&SocketAddr::V6(SocketAddrV6::new(
            Ipv6Addr::LOCALHOST,
            7000,
            0,
            0,
        )));
        assert_eq!(v6.family(), libc::AF_INET6);
        assert_eq!(v6.len as usize, mem::size_of::<libc::sockaddr_in6>());
    }

    #[test]
    fn unix_path_limits() {
        assert!(RawAddr::unix(Path::new("/tmp/dev.sock")).is_ok());
        let long = "x".repeat(200);
        assert_eq!(
            RawAddr::unix(Path::new(&long)).err().map(|e| e.kind()),
            Some(io::ErrorKind::InvalidInput)
        );
    }

    #[test]
    fn cancelled_handle_refuses_to_connect() {
        let canceller = ConnectCanceller::new();
        canceller.cancel();
        let addr = RawAddr::inet(&"127.0.0.1:9".parse().unwrap());
        let err = connect(&addr, 0, None, &canceller).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }
}
