use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::address::LinkAddress;
use crate::cancel::ConnectCanceller;
use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Establish a link to `address` (blocking).
///
/// `timeout` bounds each connection attempt. On Linux it applies to every
/// link kind; elsewhere only TCP honours it.
pub fn connect(address: &LinkAddress, timeout: Option<Duration>) -> Result<LinkStream> {
    connect_cancellable(address, timeout, &ConnectCanceller::new())
}

/// Like [`connect`], but abortable from another thread through `canceller`.
///
/// Returns [`TransportError::Cancelled`] once the handle is cancelled, even
/// if the platform call completed; the established link is closed.
pub fn connect_cancellable(
    address: &LinkAddress,
    timeout: Option<Duration>,
    canceller: &ConnectCanceller,
) -> Result<LinkStream> {
    if canceller.is_cancelled() {
        return Err(TransportError::Cancelled);
    }
    let result = open(address, timeout, canceller);
    if canceller.is_cancelled() {
        debug!(%address, "connect cancelled");
        return Err(TransportError::Cancelled);
    }
    let stream = result?;
    debug!(%address, "link established");
    Ok(stream)
}

fn open(
    address: &LinkAddress,
    timeout: Option<Duration>,
    canceller: &ConnectCanceller,
) -> Result<LinkStream> {
    let connect_err = |source: std::io::Error| TransportError::Connect {
        address: address.to_string(),
        source,
    };

    let stream = match address {
        LinkAddress::Tcp(host_port) => {
            connect_tcp(host_port, timeout, canceller).map_err(connect_err)?
        }

        #[cfg(target_os = "linux")]
        LinkAddress::Unix(path) => crate::socket::RawAddr::unix(path)
            .and_then(|addr| crate::socket::connect(&addr, 0, timeout, canceller))
            .map(|fd| LinkStream::from(std::os::unix::net::UnixStream::from(fd)))
            .map_err(connect_err)?,
        #[cfg(all(unix, not(target_os = "linux")))]
        LinkAddress::Unix(path) => {
            let _ = timeout;
            std::os::unix::net::UnixStream::connect(path)
                .map(LinkStream::from)
                .map_err(connect_err)?
        }
        #[cfg(not(unix))]
        LinkAddress::Unix(_) => return Err(TransportError::Unsupported("unix")),

        #[cfg(target_os = "linux")]
        LinkAddress::Rfcomm { device, channel } => crate::socket::connect(
            &crate::rfcomm::sockaddr(*device, *channel),
            crate::rfcomm::BTPROTO_RFCOMM,
            timeout,
            canceller,
        )
        .map(|fd| LinkStream::from(crate::rfcomm::RfcommStream::from(fd)))
        .map_err(connect_err)?,
        #[cfg(not(target_os = "linux"))]
        LinkAddress::Rfcomm { .. } => return Err(TransportError::Unsupported("rfcomm")),
    };
    Ok(stream)
}

fn connect_tcp(
    host_port: &str,
    timeout: Option<Duration>,
    canceller: &ConnectCanceller,
) -> std::io::Result<LinkStream> {
    let mut last_err = None;
    for addr in host_port.to_socket_addrs()? {
        match connect_tcp_addr(&addr, timeout, canceller) {
            Ok(stream) => {
                // Frames are written one byte at a time; do not let Nagle hold them back.
                stream.set_nodelay(true)?;
                return Ok(LinkStream::from(stream));
            }
            Err(err) if canceller.is_cancelled() => return Err(err),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host name did not resolve to any address",
        )
    }))
}

#[cfg(target_os = "linux")]
fn connect_tcp_addr(
    addr: &std::net::SocketAddr,
    timeout: Option<Duration>,
    canceller: &ConnectCanceller,
) -> std::io::Result<TcpStream> {
    crate::socket::connect(&crate::socket::RawAddr::inet(addr), 0, timeout, canceller)
        .map(TcpStream::from)
}

#[cfg(not(target_os = "linux"))]
fn connect_tcp_addr(
    addr: &std::net::SocketAddr,
    timeout: Option<Duration>,
    _canceller: &ConnectCanceller,
) -> std::io::Result<TcpStream> {
    match timeout {
        Some(timeout) => TcpStream::connect_timeout(addr, timeout),
        None => TcpStream::connect(addr),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// A loopback listener whose accept queue is full, so further SYNs are
    /// dropped and connects stay pending.
    #[cfg(target_os = "linux")]
    fn stalled_listener() -> (TcpListener, TcpStream, LinkAddress) {
        use std::os::fd::AsRawFd;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        // SAFETY: listen(2) on an open listening socket only changes its backlog.
        assert_eq!(unsafe { libc::listen(listener.as_raw_fd(), 0) }, 0);
        let queued = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        thread::sleep(Duration::from_millis(50));
        let address = format!("tcp://{}", listener.local_addr().unwrap())
            .parse()
            .unwrap();
        (listener, queued, address)
    }

    #[test]
    fn connects_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let address: LinkAddress = format!("tcp://127.0.0.1:{port}").parse().unwrap();
        let mut stream = connect(&address, Some(Duration::from_secs(2))).unwrap();
        assert_eq!(stream.transport_name(), "tcp");
        stream.write_all(b"ping").unwrap();

        assert_eq!(&server.join().unwrap(), b"ping");
    }

    #[test]
    fn refused_tcp_reports_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let address: LinkAddress = format!("tcp://127.0.0.1:{port}").parse().unwrap();
        let err = connect(&address, Some(Duration::from_secs(2))).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains("tcp://127.0.0.1"));
    }

    #[test]
    #[cfg(unix)]
    fn connects_over_unix_socket() {
        let dir = std::env::temp_dir().join(format!("serlink-connect-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("dev.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[0x05]).unwrap();
        });

        let address = LinkAddress::Unix(sock_path.clone());
        let mut stream = connect(&address, None).unwrap();
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(byte, [0x05]);

        server.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    #[cfg(unix)]
    fn missing_unix_socket_reports_connect_error() {
        let address = LinkAddress::Unix("/nonexistent/serlink/dev.sock".into());
        let err = connect(&address, None).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn cancelled_handle_fails_before_connecting() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address: LinkAddress = format!("tcp://{}", listener.local_addr().unwrap())
            .parse()
            .unwrap();
        let canceller = ConnectCanceller::new();
        canceller.cancel();
        let err = connect_cancellable(&address, None, &canceller).unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn cancel_aborts_a_pending_connect() {
        let (_listener, _queued, address) = stalled_listener();
        let canceller = ConnectCanceller::new();

        let attempt = {
            use std::time::Instant;

            let canceller = canceller.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let result =
                    connect_cancellable(&address, Some(Duration::from_secs(30)), &canceller);
                (result, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(200));
        assert!(!attempt.is_finished(), "connect should still be pending");
        canceller.cancel();

        let (result, elapsed) = attempt.join().unwrap();
        assert!(matches!(result, Err(TransportError::Cancelled)));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn pending_connect_honours_timeout() {
        let (_listener, _queued, address) = stalled_listener();
        let err = connect(&address, Some(Duration::from_millis(300))).unwrap_err();
        match err {
            TransportError::Connect { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
