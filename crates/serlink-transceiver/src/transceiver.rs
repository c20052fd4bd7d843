use std::fmt;
use std::sync::Arc;

use serlink_frame::{FrameCodec, FrameError};

use crate::listener::TransceiverListener;
use crate::state::ConnectionState;

/// Outcome of [`Transceiver::send`].
///
/// None of these are fatal. A caller that only cares whether the frame was
/// fully queued checks [`is_queued`](SendStatus::is_queued).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// The whole encoded frame is in the transmit buffer.
    Queued { bytes: usize },
    /// The transmit buffer filled up; the trailing `dropped` bytes of the
    /// frame were discarded.
    Overflow { queued: usize, dropped: usize },
    /// No codec is attached; nothing was queued.
    NoCodec,
    /// The link is not connected; nothing was queued.
    NotConnected,
    /// The payload cannot be framed; nothing was queued.
    Rejected(FrameError),
}

impl SendStatus {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued { bytes } => write!(f, "queued {bytes} bytes"),
            Self::Overflow { queued, dropped } => {
                write!(f, "transmit buffer overflow: queued {queued}, dropped {dropped}")
            }
            Self::NoCodec => f.write_str("no codec attached"),
            Self::NotConnected => f.write_str("not connected"),
            Self::Rejected(err) => write!(f, "rejected: {err}"),
        }
    }
}

/// A framed, full-duplex link to one remote device.
///
/// All methods take `&self` so a transceiver can be shared behind an
/// `Arc` between the application and listener callbacks.
pub trait Transceiver: Send + Sync {
    /// Start connecting to `address` in the background.
    ///
    /// Does nothing (with a warning) unless the state is
    /// [`ConnectionState::NotConnected`]. Failures are reported as a
    /// transition back to `NotConnected`, never returned.
    fn connect(&self, address: &str);

    /// Stop all link activity and release the link. Idempotent.
    fn disconnect(&self);

    /// Frame `payload` and queue it for transmission.
    fn send(&self, payload: &[u8]) -> SendStatus;

    fn status(&self) -> ConnectionState;

    fn attach_codec(&self, codec: FrameCodec);

    fn detach_codec(&self);

    /// Replace the listener. Only one listener is held at a time.
    fn set_listener(&self, listener: Arc<dyn TransceiverListener>);

    fn clear_listener(&self);
}
