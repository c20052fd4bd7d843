use std::fs;

use serlink_frame::{DecodedFrame, FrameDecoder};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = match (&args.bytes, &args.file) {
        (Some(hex), _) => parse_hex(hex)?,
        (None, Some(path)) => fs::read(path).map_err(|err| {
            CliError::new(USAGE, format!("failed reading {}: {err}", path.display()))
        })?,
        (None, None) => return Err(CliError::usage("no input given")),
    };

    let frames = decode_stream(&bytes);
    for frame in &frames {
        print_frame(frame, format);
    }

    if frames.is_empty() {
        return Err(CliError::new(DATA_INVALID, "no complete frame found"));
    }
    if frames.iter().any(|frame| !frame.valid) {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Collect every frame, taking each one as soon as its TAIL is consumed.
fn decode_stream(bytes: &[u8]) -> Vec<DecodedFrame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for &b in bytes {
        decoder.decode(b);
        if let Some(frame) = decoder.take_frame() {
            frames.push(frame);
        }
    }
    frames
}
