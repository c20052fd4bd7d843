/// Errors that can occur while establishing or using a link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link address could not be parsed.
    #[error("invalid link address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the link stream.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connect attempt was cancelled.
    #[error("connect cancelled")]
    Cancelled,

    /// The link kind is not available on this platform.
    #[error("{0} links are not supported on this platform")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
