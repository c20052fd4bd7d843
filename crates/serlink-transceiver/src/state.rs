use std::fmt;

use serde::Serialize;

/// Connection lifecycle of a transceiver.
///
/// `NotConnected → Connecting → Connected`, and back to `NotConnected` on an
/// explicit disconnect, a failed connect attempt, or a lost link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Numeric code: 0 not connected, 1 connecting, 2 connected.
    pub const fn code(self) -> u8 {
        match self {
            Self::NotConnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotConnected => "not-connected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
