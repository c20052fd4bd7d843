use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, Sender};

use serlink_frame::DecodedFrame;

use crate::state::ConnectionState;

/// Sink for transceiver events.
///
/// Callbacks run synchronously on whichever internal thread detected the
/// event (connector, reader or writer) or on the caller's thread for
/// `connect`/`disconnect`. Implementations hand work off to their own
/// threads if they need to; they may call back into the transceiver.
pub trait TransceiverListener: Send + Sync {
    /// A complete frame arrived. Frames with a checksum mismatch are
    /// delivered with `valid == false`.
    fn on_data_received(&self, frame: DecodedFrame);

    /// The connection state changed. Called once per actual transition.
    fn on_status_changed(&self, state: ConnectionState);
}

/// An event observed through a [`ChannelListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransceiverEvent {
    Data(DecodedFrame),
    Status(ConnectionState),
}

/// Listener that forwards every event into an mpsc channel.
///
/// Useful when the consumer wants to process events on its own thread.
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug)]
pub struct ChannelListener {
    tx: Sender<TransceiverEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, Receiver<TransceiverEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl TransceiverListener for ChannelListener {
    fn on_data_received(&self, frame: DecodedFrame) {
        let _ = self.tx.send(TransceiverEvent::Data(frame));
    }

    fn on_status_changed(&self, state: ConnectionState) {
        let _ = self.tx.send(TransceiverEvent::Status(state));
    }
}

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a listener callback until dropped.
pub(crate) struct DispatchGuard {
    previous: bool,
}

impl DispatchGuard {
    pub(crate) fn enter() -> Self {
        let previous = DISPATCHING.with(|flag| flag.replace(true));
        Self { previous }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(self.previous));
    }
}

/// Whether the current thread is inside a listener callback.
pub(crate) fn in_dispatch() -> bool {
    DISPATCHING.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_listener_forwards_events_in_order() {
        let (listener, rx) = ChannelListener::new();
        listener.on_status_changed(ConnectionState::Connecting);
        listener.on_data_received(DecodedFrame::new(0x8F, vec![1, 2], true));
        listener.on_status_changed(ConnectionState::Connected);

        assert_eq!(
            rx.recv().unwrap(),
            TransceiverEvent::Status(ConnectionState::Connecting)
        );
        assert_eq!(
            rx.recv().unwrap(),
            TransceiverEvent::Data(DecodedFrame::new(0x8F, vec![1, 2], true))
        );
        assert_eq!(
            rx.recv().unwrap(),
            TransceiverEvent::Status(ConnectionState::Connected)
        );
    }

    #[test]
    fn channel_listener_ignores_dropped_receiver() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_status_changed(ConnectionState::NotConnected);
    }

    #[test]
    fn dispatch_guard_nests() {
        assert!(!in_dispatch());
        {
            let _outer = DispatchGuard::enter();
            assert!(in_dispatch());
            {
                let _inner = DispatchGuard::enter();
                assert!(in_dispatch());
            }
            assert!(in_dispatch());
        }
        assert!(!in_dispatch());
    }
}
