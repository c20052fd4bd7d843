//! Connection management for framed serial links.
//!
//! A [`Transceiver`] owns the link to one remote device: it frames outgoing
//! payloads, queues them in a bounded [`RingBuffer`], and delivers decoded
//! frames and [`ConnectionState`] changes to a [`TransceiverListener`].
//!
//! [`LinkTransceiver`] is the implementation over a
//! [`serlink_transport::LinkStream`], with one connector, one reader and one
//! writer thread per connection. [`DeviceManager`] layers device commands
//! and listener fan-out on top of any transceiver.

pub mod config;
pub mod device;
pub mod error;
pub mod link;
pub mod listener;
pub mod ring_buffer;
pub mod state;
pub mod transceiver;

pub use config::{LinkConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TX_CAPACITY, DEFAULT_WRITE_TIMEOUT};
pub use device::{DeviceEventsListener, DeviceManager};
pub use error::{BufferError, Result};
pub use link::LinkTransceiver;
pub use listener::{ChannelListener, TransceiverEvent, TransceiverListener};
pub use ring_buffer::RingBuffer;
pub use state::ConnectionState;
pub use transceiver::{SendStatus, Transceiver};
