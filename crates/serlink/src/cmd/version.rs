use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("serlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: serlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("SERLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "transports: tcp, unix={}, rfcomm={}",
        cfg!(unix),
        cfg!(target_os = "linux")
    );
    println!(
        "features: async={}, cli=true",
        cfg!(feature = "async")
    );
    println!(
        "frame: max_payload={} header=0x{:02X} tail=0x{:02X} escape=0x{:02X}",
        serlink_frame::MAX_PAYLOAD,
        serlink_frame::HEADER,
        serlink_frame::TAIL,
        serlink_frame::ESCAPE
    );

    Ok(SUCCESS)
}
