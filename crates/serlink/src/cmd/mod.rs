use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use serlink_transceiver::{
    ConnectionState, LinkConfig, LinkTransceiver, Transceiver, TransceiverEvent,
    DEFAULT_TX_CAPACITY,
};
use serlink_transport::LinkAddress;

use crate::exit::{CliError, CliResult, INTERNAL, TIMEOUT, TRANSPORT_ERROR, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod duty;
pub mod encode;
pub mod monitor;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a payload into a wire frame.
    Encode(EncodeArgs),
    /// Decode wire bytes and print every frame found.
    Decode(DecodeArgs),
    /// Connect, send frames, and optionally wait for replies.
    Send(SendArgs),
    /// Connect and print received frames.
    Monitor(MonitorArgs),
    /// Set the device's calibration signal duty cycle.
    Duty(DutyArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Duty(args) => duty::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Link tuning shared by every command that connects.
#[derive(Args, Debug, Clone)]
pub struct LinkOptions {
    /// Link establishment timeout (e.g. 10s, 500ms).
    #[arg(long, env = "SERLINK_CONNECT_TIMEOUT", default_value = "10s")]
    pub connect_timeout: String,
    /// Timeout for a single link write.
    #[arg(long, env = "SERLINK_WRITE_TIMEOUT", default_value = "5s")]
    pub write_timeout: String,
    /// Transmit buffer capacity in bytes.
    #[arg(long, env = "SERLINK_TX_CAPACITY", default_value_t = DEFAULT_TX_CAPACITY)]
    pub tx_capacity: usize,
}

impl LinkOptions {
    pub fn config(&self) -> CliResult<LinkConfig> {
        Ok(LinkConfig::default()
            .with_tx_capacity(self.tx_capacity)
            .with_connect_timeout(Some(parse_duration(&self.connect_timeout)?))
            .with_write_timeout(Some(parse_duration(&self.write_timeout)?)))
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Payload as hex: command id followed by parameters (e.g. 0a32).
    pub payload: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire bytes as hex.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub bytes: Option<String>,
    /// Read raw wire bytes from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Link address (rfcomm://AA:BB:CC:DD:EE:FF[/channel], AA:BB:CC:DD:EE:FF,
    /// tcp://host:port or unix:/path).
    pub address: String,
    /// Payloads as hex, one frame each.
    #[arg(required = true, num_args = 1..)]
    pub payloads: Vec<String>,
    /// Wait for N frames from the device and print them.
    #[arg(long, default_value_t = 0)]
    pub wait: usize,
    /// Maximum time to wait for replies when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub link: LinkOptions,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Link address.
    pub address: String,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub link: LinkOptions,
}

#[derive(Args, Debug)]
pub struct DutyArgs {
    /// Link address.
    pub address: String,
    /// Duty cycle in percent.
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub percent: u8,
    #[command(flatten)]
    pub link: LinkOptions,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `0a32`, `0A 32`, `0x0A,0x32` or `0a:32` into bytes.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();
    if digits.is_empty() {
        return Err(CliError::usage("payload must not be empty"));
    }
    hex::decode(&digits).map_err(|err| CliError::usage(format!("invalid hex {input:?}: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        _ => Err(CliError::usage(format!("unsupported duration unit: {unit}"))),
    }
}

/// Reject malformed addresses before any thread is started.
pub fn check_address(address: &str) -> CliResult<LinkAddress> {
    address
        .parse::<LinkAddress>()
        .map_err(|err| CliError::new(USAGE, err.to_string()))
}

/// Consume events until the pending connect attempt resolves.
pub fn wait_connected(
    events: &Receiver<TransceiverEvent>,
    address: &str,
    timeout: Duration,
) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    let mut connecting = false;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(TransceiverEvent::Status(ConnectionState::Connecting)) => connecting = true,
            Ok(TransceiverEvent::Status(ConnectionState::Connected)) => return Ok(()),
            Ok(TransceiverEvent::Status(ConnectionState::NotConnected)) if connecting => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    format!("connect to {address} failed"),
                ));
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("connect to {address} timed out after {timeout:?}"),
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(INTERNAL, "event channel closed"));
            }
        }
    }
}

/// Wait until `target` bytes have been written to the link in total.
pub fn wait_written(link: &LinkTransceiver, target: u64, timeout: Duration) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    while link.tx_bytes_written() < target {
        if link.status() != ConnectionState::Connected {
            return Err(CliError::new(
                TRANSPORT_ERROR,
                "link lost before all frames were written",
            ));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("frames not written within {timeout:?}"),
            ));
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
