use bytes::BytesMut;
use tracing::{debug, trace};

use crate::codec::{checksum, DecodedFrame, ESCAPE, HEADER, MAX_FRAME_BODY, TAIL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SearchHeader,
    LengthHigh,
    LengthLow,
    Payload,
    Tail,
}

/// Incremental, byte-at-a-time frame decoder.
///
/// At most one decoded frame is held at a time. While that frame is pending,
/// every incoming byte is discarded; decoding resumes after
/// [`take_frame`](FrameDecoder::take_frame). Callers that read continuously
/// should collect after every byte.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    escape_pending: bool,
    /// Declared payload length N.
    length: u16,
    /// Unstuffed PAYLOAD followed by CTRL; `length + 1` bytes when complete.
    body: BytesMut,
    mailbox: Option<DecodedFrame>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: State::SearchHeader,
            escape_pending: false,
            length: 0,
            body: BytesMut::new(),
            mailbox: None,
        }
    }

    /// Feed one raw byte.
    pub fn decode(&mut self, raw: u8) {
        if self.mailbox.is_some() {
            return;
        }

        let byte = if self.escape_pending {
            self.escape_pending = false;
            raw.wrapping_sub(ESCAPE)
        } else if raw == ESCAPE {
            self.escape_pending = true;
            return;
        } else {
            raw
        };

        match self.state {
            State::SearchHeader => {
                if byte == HEADER {
                    self.length = 0;
                    self.body.clear();
                    self.state = State::LengthHigh;
                }
            }
            State::LengthHigh => {
                self.length = u16::from(byte) << 8;
                self.state = State::LengthLow;
            }
            State::LengthLow => {
                self.length |= u16::from(byte);
                let total = self.length as usize + 1;
                if self.length == 0 || total > MAX_FRAME_BODY {
                    debug!(length = self.length, "discarding frame with invalid length");
                    self.state = State::SearchHeader;
                } else {
                    self.body.reserve(total);
                    self.state = State::Payload;
                }
            }
            State::Payload => {
                self.body.extend_from_slice(&[byte]);
                if self.body.len() == self.length as usize + 1 {
                    self.state = State::Tail;
                }
            }
            State::Tail => {
                if byte == TAIL {
                    self.finish_frame();
                } else {
                    trace!(byte, "missing tail, resynchronizing");
                }
                self.state = State::SearchHeader;
            }
        }
    }

    fn finish_frame(&mut self) {
        let n = self.length as usize;
        let mut body = self.body.split();
        let ctrl = body[n];
        let valid = checksum(self.length, &body[..n]) == ctrl;

        body.truncate(n);
        let command_id = body[0];
        let parameters = body.split_off(1).freeze();

        if !valid {
            debug!(command_id, "frame checksum mismatch");
        }
        self.mailbox = Some(DecodedFrame {
            command_id,
            parameters,
            valid,
        });
    }

    /// Whether a decoded frame is waiting to be collected.
    pub fn frame_pending(&self) -> bool {
        self.mailbox.is_some()
    }

    /// Collect the pending frame, re-enabling decoding.
    pub fn take_frame(&mut self) -> Option<DecodedFrame> {
        self.mailbox.take()
    }

    /// Return to header search, dropping any partial or pending frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the decoder is between frames.
    pub fn is_idle(&self) -> bool {
        self.state == State::SearchHeader && !self.escape_pending
    }
}
