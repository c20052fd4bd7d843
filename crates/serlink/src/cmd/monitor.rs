use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use serlink_frame::FrameCodec;
use serlink_transceiver::{
    ChannelListener, ConnectionState, LinkTransceiver, Transceiver, TransceiverEvent,
};
use tracing::info;

use crate::cmd::{check_address, install_ctrlc_handler, wait_connected, MonitorArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    check_address(&args.address)?;
    let config = args.link.config()?;
    let connect_wait = config.connect_timeout.unwrap_or(Duration::from_secs(10))
        + Duration::from_secs(1);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let link = LinkTransceiver::with_config(config);
    let (listener, events) = ChannelListener::new();
    link.set_listener(Arc::new(listener));
    link.attach_codec(FrameCodec::new());

    link.connect(&args.address);
    wait_connected(&events, &args.address, connect_wait)?;
    info!(address = %args.address, "monitoring");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(TransceiverEvent::Data(frame)) => {
                print_frame(&frame, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Ok(TransceiverEvent::Status(ConnectionState::NotConnected)) => {
                return Err(CliError::new(TRANSPORT_ERROR, "link lost"));
            }
            Ok(TransceiverEvent::Status(_)) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(INTERNAL, "event channel closed"));
            }
        }
    }

    link.disconnect();
    info!(frames = printed, "monitor stopped");
    Ok(SUCCESS)
}
