//! `tokio_util::codec` adapter for async byte streams.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, DecodedFrame, FrameCodec};
use crate::error::FrameError;

/// Frames a byte stream for `tokio_util::codec::Framed`.
///
/// Frames are collected as soon as their TAIL byte is consumed, so the
/// decoder's single-frame mailbox never drops input through this adapter.
#[derive(Debug, Default)]
pub struct LinkCodec {
    inner: FrameCodec,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LinkCodec {
    type Item = DecodedFrame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            self.inner.decode(byte);
            if let Some(frame) = self.inner.take_frame() {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl<'a> Encoder<&'a [u8]> for LinkCodec {
    type Error = std::io::Error;

    fn encode(&mut self, payload: &'a [u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(payload, dst).map_err(|err: FrameError| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
        })
    }
}
