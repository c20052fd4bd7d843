/// Errors that can occur during frame encoding.
///
/// Decoding never fails: corrupted frames are delivered with `valid == false`
/// and malformed lengths make the decoder resynchronize silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
