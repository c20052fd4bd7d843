use serlink_frame::FrameCodec;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex(&args.payload)?;
    let frame = FrameCodec::new()
        .encode(&payload)
        .map_err(|err| frame_error("encode failed", err))?;
    print_encoded(&payload, &frame, format);
    Ok(SUCCESS)
}
