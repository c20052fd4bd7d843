use bytes::{BufMut, Bytes, BytesMut};

use crate::decoder::FrameDecoder;
use crate::error::{FrameError, Result};

/// Start-of-frame marker.
pub const HEADER: u8 = 0x05;

/// End-of-frame marker.
pub const TAIL: u8 = 0x04;

/// Escape marker for byte stuffing.
pub const ESCAPE: u8 = 0x06;

/// Largest unstuffed body (payload + CTRL) a decoder accepts.
pub const MAX_FRAME_BODY: usize = 4096;

/// Largest payload a conforming decoder will accept.
pub const MAX_PAYLOAD: usize = MAX_FRAME_BODY - 1;

/// Largest payload the 16-bit length field can describe.
pub const MAX_ENCODABLE_PAYLOAD: usize = u16::MAX as usize;

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// First payload byte.
    pub command_id: u8,
    /// Remaining payload bytes.
    pub parameters: Bytes,
    /// Whether the CTRL byte matched the recomputed checksum.
    pub valid: bool,
}

impl DecodedFrame {
    /// Create a new decoded frame.
    pub fn new(command_id: u8, parameters: impl Into<Bytes>, valid: bool) -> Self {
        Self {
            command_id,
            parameters: parameters.into(),
            valid,
        }
    }

    /// Reassemble the payload (`command_id || parameters`).
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.parameters.len());
        payload.push(self.command_id);
        payload.extend_from_slice(&self.parameters);
        payload
    }
}

/// Compute the CTRL byte for a payload of the given declared length.
///
/// CTRL makes `LEN_H + LEN_L + Σpayload + CTRL` vanish modulo 256.
pub fn checksum(len: u16, payload: &[u8]) -> u8 {
    let [len_h, len_l] = len.to_be_bytes();
    let sum = payload
        .iter()
        .fold(len_h.wrapping_add(len_l), |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬────────────────────────────────────────┬──────┐
/// │ HEADER │ stuffed( LEN_H LEN_L PAYLOAD[N] CTRL ) │ TAIL │
/// │  0x05  │ 0x04/0x05/0x06 -> 0x06, value + 0x06   │ 0x04 │
/// └────────┴────────────────────────────────────────┴──────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_ENCODABLE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_ENCODABLE_PAYLOAD,
        });
    }
    let len = payload.len() as u16;
    let [len_h, len_l] = len.to_be_bytes();
    let ctrl = checksum(len, payload);

    // Worst case every body byte is stuffed.
    dst.reserve(2 + 2 * (payload.len() + 3));
    dst.put_u8(HEADER);
    put_stuffed(dst, len_h);
    put_stuffed(dst, len_l);
    for &b in payload {
        put_stuffed(dst, b);
    }
    put_stuffed(dst, ctrl);
    dst.put_u8(TAIL);
    Ok(())
}

fn put_stuffed(dst: &mut BytesMut, b: u8) {
    if is_reserved(b) {
        dst.put_u8(ESCAPE);
        dst.put_u8(b.wrapping_add(ESCAPE));
    } else {
        dst.put_u8(b);
    }
}

/// Returns true for byte values that must be stuffed inside a frame body.
pub fn is_reserved(b: u8) -> bool {
    matches!(b, HEADER | TAIL | ESCAPE)
}

/// Encoder plus incremental decoder for one link.
///
/// Encoding is stateless. Decoding keeps per-stream state and must only be
/// driven by a single reader.
#[derive(Debug, Default)]
pub struct FrameCodec {
    decoder: FrameDecoder,
}

impl FrameCodec {
    /// Create a codec with a fresh decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a payload into a new frame buffer.
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        encode_frame(payload, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Feed one raw byte into the decoder.
    pub fn decode(&mut self, byte: u8) {
        self.decoder.decode(byte);
    }

    /// Whether a decoded frame is waiting to be collected.
    pub fn frame_pending(&self) -> bool {
        self.decoder.frame_pending()
    }

    /// Collect the pending frame, re-enabling decoding.
    pub fn take_frame(&mut self) -> Option<DecodedFrame> {
        self.decoder.take_frame()
    }

    /// Drop any partial frame and pending frame.
    pub fn reset(&mut self) {
        self.decoder.reset();
    }

    /// Borrow the decoder.
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}
