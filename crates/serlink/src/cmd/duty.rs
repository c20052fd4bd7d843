use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use serlink_frame::{DecodedFrame, FrameCodec};
use serlink_transceiver::{
    ConnectionState, DeviceEventsListener, DeviceManager, LinkTransceiver, Transceiver,
    TransceiverEvent,
};

use crate::cmd::{check_address, wait_connected, wait_written, DutyArgs};
use crate::exit::{send_status, CliResult, SUCCESS};

/// Forwards manager events into a channel.
struct EventForwarder(Sender<TransceiverEvent>);

impl DeviceEventsListener for EventForwarder {
    fn on_connection_status_changed(&self, state: ConnectionState) {
        let _ = self.0.send(TransceiverEvent::Status(state));
    }

    fn on_data_received(&self, frame: &DecodedFrame) {
        let _ = self.0.send(TransceiverEvent::Data(frame.clone()));
    }
}

pub fn run(args: DutyArgs) -> CliResult<i32> {
    check_address(&args.address)?;
    let config = args.link.config()?;
    let connect_wait = config.connect_timeout.unwrap_or(Duration::from_secs(10))
        + Duration::from_secs(1);
    let write_wait = config.write_timeout.unwrap_or(Duration::from_secs(5));

    let link = Arc::new(LinkTransceiver::with_config(config));
    link.attach_codec(FrameCodec::new());
    let manager = DeviceManager::new(link.clone());

    let (tx, events) = mpsc::channel();
    manager.add_listener(Arc::new(EventForwarder(tx)));

    manager.connect(&args.address);
    wait_connected(&events, &args.address, connect_wait)?;

    let before = link.tx_bytes_written();
    let queued = send_status(
        "duty cycle command failed",
        manager.set_calibration_duty_percent(args.percent),
    )?;
    wait_written(&link, before + queued as u64, write_wait)?;

    manager.disconnect();
    Ok(SUCCESS)
}
