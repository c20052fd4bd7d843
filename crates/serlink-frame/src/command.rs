//! Known command identifiers.
//!
//! The first payload byte of every frame is a command id; the remaining
//! bytes are that command's parameters.

/// Set the calibration signal duty cycle. Parameter: one byte, 0-100 (%).
pub const CALIBRATION_DUTY_CYCLE: u8 = 0x0A;

/// Acquisition data pushed by the device.
pub const DATA_TRANSFER: u8 = 0x8F;

/// Returns a human-readable name for a command id.
pub fn command_name(id: u8) -> &'static str {
    match id {
        CALIBRATION_DUTY_CYCLE => "CALIBRATION_DUTY_CYCLE",
        DATA_TRANSFER => "DATA_TRANSFER",
        _ => "UNKNOWN",
    }
}
