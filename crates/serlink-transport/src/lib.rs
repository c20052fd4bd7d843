//! Point-to-point byte links.
//!
//! Provides a unified blocking stream over the links a remote device can sit
//! behind:
//! - Bluetooth RFCOMM (Serial Port Profile) sockets on Linux
//! - TCP, for serial-to-network bridges
//! - Unix domain sockets
//!
//! This is the lowest layer of serlink. Everything else builds on top of
//! the [`LinkStream`] type provided here.

pub mod address;
pub mod cancel;
pub mod connector;
pub mod error;
pub mod stream;

#[cfg(target_os = "linux")]
pub mod rfcomm;
#[cfg(target_os = "linux")]
mod socket;

pub use address::{BdAddr, LinkAddress, SPP_DEFAULT_CHANNEL};
pub use cancel::ConnectCanceller;
pub use connector::{connect, connect_cancellable};
pub use error::{Result, TransportError};
pub use stream::LinkStream;
