use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serlink_frame::{DecodedFrame, FrameCodec};
use serlink_transceiver::{
    ChannelListener, ConnectionState, LinkTransceiver, Transceiver, TransceiverEvent,
};
use tracing::info;

use crate::cmd::{check_address, parse_duration, parse_hex, wait_connected, wait_written, SendArgs};
use crate::exit::{send_status, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    check_address(&args.address)?;
    let payloads = args
        .payloads
        .iter()
        .map(|p| parse_hex(p))
        .collect::<CliResult<Vec<_>>>()?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.link.config()?;
    let connect_wait = config.connect_timeout.unwrap_or(wait_timeout) + Duration::from_secs(1);
    let write_wait = config.write_timeout.unwrap_or(wait_timeout);

    let link = LinkTransceiver::with_config(config);
    let (listener, events) = ChannelListener::new();
    link.set_listener(Arc::new(listener));
    link.attach_codec(FrameCodec::new());

    link.connect(&args.address);
    wait_connected(&events, &args.address, connect_wait)?;

    let mut target = link.tx_bytes_written();
    for payload in &payloads {
        target += send_status("send failed", link.send(payload))? as u64;
    }
    wait_written(&link, target, write_wait)?;
    info!(frames = payloads.len(), bytes = target, "frames sent");

    if args.wait > 0 {
        let frames = collect_frames(&events, args.wait, wait_timeout)?;
        for frame in &frames {
            print_frame(frame, format);
        }
    }

    link.disconnect();
    Ok(SUCCESS)
}

fn collect_frames(
    events: &Receiver<TransceiverEvent>,
    count: usize,
    timeout: Duration,
) -> CliResult<Vec<DecodedFrame>> {
    let deadline = Instant::now() + timeout;
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(TransceiverEvent::Data(frame)) => frames.push(frame),
            Ok(TransceiverEvent::Status(ConnectionState::NotConnected)) => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    format!("link lost after {} of {count} frames", frames.len()),
                ));
            }
            Ok(TransceiverEvent::Status(_)) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("received {} of {count} frames within {timeout:?}", frames.len()),
                ));
            }
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn collects_requested_frames() {
        let (tx, rx) = mpsc::channel();
        for i in 0..3u8 {
            tx.send(TransceiverEvent::Data(DecodedFrame::new(0x8F, vec![i], true)))
                .unwrap();
        }
        let frames = collect_frames(&rx, 2, Duration::from_secs(1)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].parameters.as_ref(), &[1]);
    }

    #[test]
    fn link_loss_while_waiting_is_transport_error() {
        let (tx, rx) = mpsc::channel();
        tx.send(TransceiverEvent::Status(ConnectionState::NotConnected))
            .unwrap();
        let err = collect_frames(&rx, 1, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn missing_frames_time_out() {
        let (_tx, rx) = mpsc::channel::<TransceiverEvent>();
        let err = collect_frames(&rx, 1, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }
}
