use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// RFCOMM channel used when an address does not name one (SPP default).
pub const SPP_DEFAULT_CHANNEL: u8 = 1;

/// Highest valid RFCOMM server channel.
const MAX_RFCOMM_CHANNEL: u8 = 30;

/// A Bluetooth device address (`AA:BB:CC:DD:EE:FF`).
///
/// Bytes are kept in display order, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// Bytes in the little-endian order the kernel socket API expects.
    pub fn to_le_bytes(self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

impl FromStr for BdAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| TransportError::InvalidAddress {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| invalid("expected six colon-separated octets"))?;
            if part.len() != 2 {
                return Err(invalid("each octet must be two hex digits"));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid("octet is not hex"))?;
        }
        if parts.next().is_some() {
            return Err(invalid("expected six colon-separated octets"));
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Where a link connects to.
///
/// Accepted textual forms:
/// ```text
/// rfcomm://AA:BB:CC:DD:EE:FF[/channel]
/// AA:BB:CC:DD:EE:FF                  (RFCOMM, channel 1)
/// tcp://host:port
/// unix:/path/to/socket
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddress {
    /// Bluetooth RFCOMM socket.
    Rfcomm { device: BdAddr, channel: u8 },
    /// TCP stream to `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl LinkAddress {
    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            LinkAddress::Rfcomm { .. } => "rfcomm",
            LinkAddress::Tcp(_) => "tcp",
            LinkAddress::Unix(_) => "unix",
        }
    }
}

impl FromStr for LinkAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        let invalid = |reason: &str| TransportError::InvalidAddress {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = input.strip_prefix("tcp://") {
            let (host, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| invalid("expected tcp://host:port"))?;
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            port.parse::<u16>()
                .map_err(|_| invalid("port must be a number in 0-65535"))?;
            return Ok(LinkAddress::Tcp(rest.to_string()));
        }

        if let Some(path) = input.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(LinkAddress::Unix(PathBuf::from(path)));
        }

        let rest = input.strip_prefix("rfcomm://").unwrap_or(input);
        let (device, channel) = match rest.split_once('/') {
            Some((device, channel)) => {
                let channel = channel
                    .parse::<u8>()
                    .map_err(|_| invalid("rfcomm channel must be a number"))?;
                (device, channel)
            }
            None => (rest, SPP_DEFAULT_CHANNEL),
        };
        if !(1..=MAX_RFCOMM_CHANNEL).contains(&channel) {
            return Err(invalid("rfcomm channel must be in 1-30"));
        }
        let device = device.parse::<BdAddr>().map_err(|_| {
            invalid("expected rfcomm://AA:BB:CC:DD:EE:FF, tcp://host:port or unix:/path")
        })?;

        Ok(LinkAddress::Rfcomm { device, channel })
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkAddress::Rfcomm { device, channel } => write!(f, "rfcomm://{device}/{channel}"),
            LinkAddress::Tcp(host_port) => write!(f, "tcp://{host_port}"),
            LinkAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}
