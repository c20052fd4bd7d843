/// Errors reported by the transmit ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// `pop` was called with nothing to read.
    #[error("empty buffer")]
    Empty,
}

pub type Result<T> = std::result::Result<T, BufferError>;
