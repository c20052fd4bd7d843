use std::fmt;

use serlink_frame::FrameError;
use serlink_transceiver::SendStatus;

// Exit codes follow the sysexits/timeout(1) conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

/// Map a send outcome to a CLI error. Only a fully queued frame succeeds.
pub fn send_status(context: &str, status: SendStatus) -> CliResult<usize> {
    match status {
        SendStatus::Queued { bytes } => Ok(bytes),
        SendStatus::Rejected(err) => Err(frame_error(context, err)),
        SendStatus::NotConnected => Err(CliError::new(
            TRANSPORT_ERROR,
            format!("{context}: {status}"),
        )),
        SendStatus::Overflow { .. } => {
            Err(CliError::new(FAILURE, format!("{context}: {status}")))
        }
        SendStatus::NoCodec => Err(CliError::new(INTERNAL, format!("{context}: {status}"))),
    }
}
