//! Byte-stuffed, checksummed command framing for serial links.
//!
//! Every payload (a command id followed by its parameters) travels as:
//! - a `0x05` HEADER byte
//! - a 16-bit big-endian payload length, the payload, and a CTRL checksum
//!   byte, all byte-stuffed so `0x04`/`0x05`/`0x06` never appear literally
//! - a `0x04` TAIL byte
//!
//! Decoding is incremental, one byte at a time, so it can sit directly behind
//! a blocking single-byte read loop.

pub mod codec;
pub mod command;
pub mod decoder;
pub mod error;

#[cfg(feature = "async")]
pub mod link_codec;

pub use codec::{
    checksum, encode_frame, is_reserved, DecodedFrame, FrameCodec, ESCAPE, HEADER,
    MAX_ENCODABLE_PAYLOAD, MAX_FRAME_BODY, MAX_PAYLOAD, TAIL,
};
pub use command::{command_name, CALIBRATION_DUTY_CYCLE, DATA_TRANSFER};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};

#[cfg(feature = "async")]
pub use link_codec::LinkCodec;
