//! Framed command links to remote devices.
//!
//! serlink moves checksummed, byte-stuffed command frames over unreliable
//! point-to-point byte links such as Bluetooth Serial Port Profile sockets.
//!
//! # Crate Structure
//!
//! - [`transport`] — Link addresses and blocking byte streams (RFCOMM, TCP, UDS)
//! - [`frame`] — Frame encoding and the incremental frame decoder
//! - [`transceiver`] — Connection state machine, transmit buffer and link threads

/// Re-export transport types.
pub mod transport {
    pub use serlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serlink_frame::*;
}

/// Re-export transceiver types.
pub mod transceiver {
    pub use serlink_transceiver::*;
}
