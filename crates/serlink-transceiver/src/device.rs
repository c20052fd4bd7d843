//! Device-level command layer on top of a [`Transceiver`].

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serlink_frame::{DecodedFrame, CALIBRATION_DUTY_CYCLE};
use tracing::{debug, info, warn};

use crate::listener::TransceiverListener;
use crate::state::ConnectionState;
use crate::transceiver::{SendStatus, Transceiver};

/// Receives device events fanned out by a [`DeviceManager`].
pub trait DeviceEventsListener: Send + Sync {
    fn on_connection_status_changed(&self, state: ConnectionState);

    fn on_data_received(&self, frame: &DecodedFrame);
}

/// Owns a transceiver and fans its events out to any number of listeners.
///
/// The manager registers itself as the transceiver's only listener; attach
/// application listeners with [`add_listener`](DeviceManager::add_listener)
/// instead of on the transceiver directly.
pub struct DeviceManager {
    inner: Arc<Inner>,
}

struct Inner {
    transceiver: Arc<dyn Transceiver>,
    listeners: RwLock<Vec<Arc<dyn DeviceEventsListener>>>,
}

/// Transceiver-side listener. Holds the manager weakly so the transceiver
/// does not keep it alive.
struct Relay {
    inner: Weak<Inner>,
}

impl TransceiverListener for Relay {
    fn on_data_received(&self, frame: DecodedFrame) {
        if let Some(inner) = self.inner.upgrade() {
            inner.data_received(&frame);
        }
    }

    fn on_status_changed(&self, state: ConnectionState) {
        if let Some(inner) = self.inner.upgrade() {
            inner.status_changed(state);
        }
    }
}

impl Inner {
    fn snapshot(&self) -> Vec<Arc<dyn DeviceEventsListener>> {
        self.listeners.read().clone()
    }

    fn data_received(&self, frame: &DecodedFrame) {
        debug!(
            command_id = frame.command_id,
            command = serlink_frame::command_name(frame.command_id),
            valid = frame.valid,
            "device data received"
        );
        for listener in self.snapshot() {
            listener.on_data_received(frame);
        }
    }

    fn status_changed(&self, state: ConnectionState) {
        info!(%state, "device connection status changed");
        for listener in self.snapshot() {
            listener.on_connection_status_changed(state);
        }
    }
}

impl DeviceManager {
    pub fn new(transceiver: Arc<dyn Transceiver>) -> Self {
        let inner = Arc::new(Inner {
            transceiver,
            listeners: RwLock::new(Vec::new()),
        });
        let relay = Relay {
            inner: Arc::downgrade(&inner),
        };
        inner.transceiver.set_listener(Arc::new(relay));
        Self { inner }
    }

    /// The managed transceiver, e.g. to attach a codec.
    pub fn transceiver(&self) -> &Arc<dyn Transceiver> {
        &self.inner.transceiver
    }

    pub fn connect(&self, address: &str) {
        self.inner.transceiver.connect(address);
    }

    pub fn disconnect(&self) {
        self.inner.transceiver.disconnect();
    }

    pub fn status(&self) -> ConnectionState {
        self.inner.transceiver.status()
    }

    /// Register a listener and immediately report the current status to it.
    /// Adding the same listener twice registers it once.
    pub fn add_listener(&self, listener: Arc<dyn DeviceEventsListener>) {
        {
            let mut listeners = self.inner.listeners.write();
            if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                listeners.push(Arc::clone(&listener));
            }
        }
        listener.on_connection_status_changed(self.status());
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DeviceEventsListener>) {
        self.inner
            .listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Set the calibration signal duty cycle.
    ///
    /// `alpha` is a fraction in 0.0..=1.0, sent as a whole percentage
    /// (truncated, clamped to 0..=100). Ignored unless connected.
    pub fn set_calibration_duty_cycle(&self, alpha: f32) -> SendStatus {
        self.set_calibration_duty_percent(duty_cycle_percent(alpha))
    }

    /// Set the calibration signal duty cycle as a percentage, clamped to 100.
    pub fn set_calibration_duty_percent(&self, percent: u8) -> SendStatus {
        let state = self.status();
        if state != ConnectionState::Connected {
            warn!(%state, "not connected, duty cycle command ignored");
            return SendStatus::NotConnected;
        }

        let percent = percent.min(100);
        let status = self
            .inner
            .transceiver
            .send(&[CALIBRATION_DUTY_CYCLE, percent]);
        info!(percent, %status, "calibration duty cycle sent");
        status
    }
}

fn duty_cycle_percent(alpha: f32) -> u8 {
    ((alpha * 100.0) as i32).clamp(0, 100) as u8
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.inner.transceiver.disconnect();
        self.inner.transceiver.clear_listener();
        self.inner.listeners.write().clear();
        debug!("device manager dropped");
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serlink_frame::FrameCodec;

    use super::*;

    #[derive(Default)]
    struct MockTransceiver {
        state: Mutex<ConnectionState>,
        sent: Mutex<Vec<Vec<u8>>>,
        connects: Mutex<Vec<String>>,
        disconnects: Mutex<usize>,
        listener: Mutex<Option<Arc<dyn TransceiverListener>>>,
    }

    impl MockTransceiver {
        fn emit_status(&self, state: ConnectionState) {
            *self.state.lock() = state;
            let listener = self.listener.lock().clone();
            if let Some(listener) = listener {
                listener.on_status_changed(state);
            }
        }

        fn emit_data(&self, frame: DecodedFrame) {
            let listener = self.listener.lock().clone();
            if let Some(listener) = listener {
                listener.on_data_received(frame);
            }
        }
    }

    impl Transceiver for MockTransceiver {
        fn connect(&self, address: &str) {
            self.connects.lock().push(address.to_string());
        }

        fn disconnect(&self) {
            *self.disconnects.lock() += 1;
        }

        fn send(&self, payload: &[u8]) -> SendStatus {
            self.sent.lock().push(payload.to_vec());
            SendStatus::Queued {
                bytes: payload.len() + 4,
            }
        }

        fn status(&self) -> ConnectionState {
            *self.state.lock()
        }

        fn attach_codec(&self, _codec: FrameCodec) {}

        fn detach_codec(&self) {}

        fn set_listener(&self, listener: Arc<dyn TransceiverListener>) {
            *self.listener.lock() = Some(listener);
        }

        fn clear_listener(&self) {
            *self.listener.lock() = None;
        }
    }

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<ConnectionState>>,
        frames: Mutex<Vec<DecodedFrame>>,
    }

    impl DeviceEventsListener for Recorder {
        fn on_connection_status_changed(&self, state: ConnectionState) {
            self.statuses.lock().push(state);
        }

        fn on_data_received(&self, frame: &DecodedFrame) {
            self.frames.lock().push(frame.clone());
        }
    }

    fn setup() -> (Arc<MockTransceiver>, DeviceManager) {
        let mock = Arc::new(MockTransceiver::default());
        let manager = DeviceManager::new(mock.clone());
        (mock, manager)
    }

    #[test]
    fn registers_itself_on_the_transceiver() {
        let (mock, _manager) = setup();
        assert!(mock.listener.lock().is_some());
    }

    #[test]
    fn add_listener_reports_current_status() {
        let (mock, manager) = setup();
        *mock.state.lock() = ConnectionState::Connected;
        let recorder = Arc::new(Recorder::default());
        manager.add_listener(recorder.clone());
        assert_eq!(*recorder.statuses.lock(), vec![ConnectionState::Connected]);
    }

    #[test]
    fn duplicate_listener_is_registered_once() {
        let (mock, manager) = setup();
        let recorder = Arc::new(Recorder::default());
        manager.add_listener(recorder.clone());
        manager.add_listener(recorder.clone());
        assert_eq!(manager.listener_count(), 1);

        mock.emit_status(ConnectionState::Connecting);
        assert_eq!(
            *recorder.statuses.lock(),
            vec![
                ConnectionState::NotConnected,
                ConnectionState::NotConnected,
                ConnectionState::Connecting
            ]
        );
    }

    #[test]
    fn fans_out_events_to_all_listeners() {
        let (mock, manager) = setup();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        manager.add_listener(first.clone());
        manager.add_listener(second.clone());

        let frame = DecodedFrame::new(0x8F, vec![1, 2, 3], true);
        mock.emit_data(frame.clone());
        mock.emit_status(ConnectionState::Connected);

        for recorder in [&first, &second] {
            assert_eq!(*recorder.frames.lock(), vec![frame.clone()]);
            assert_eq!(
                recorder.statuses.lock().last(),
                Some(&ConnectionState::Connected)
            );
        }
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let (mock, manager) = setup();
        let recorder = Arc::new(Recorder::default());
        let handle: Arc<dyn DeviceEventsListener> = recorder.clone();
        manager.add_listener(handle.clone());
        manager.remove_listener(&handle);
        assert_eq!(manager.listener_count(), 0);

        mock.emit_status(ConnectionState::Connected);
        assert_eq!(recorder.statuses.lock().len(), 1);
    }

    #[test]
    fn duty_cycle_requires_connection() {
        let (mock, manager) = setup();
        assert_eq!(
            manager.set_calibration_duty_cycle(0.5),
            SendStatus::NotConnected
        );
        assert!(mock.sent.lock().is_empty());
    }

    #[test]
    fn duty_cycle_sends_percentage_command() {
        let (mock, manager) = setup();
        mock.emit_status(ConnectionState::Connected);

        assert!(manager.set_calibration_duty_cycle(0.5).is_queued());
        manager.set_calibration_duty_cycle(0.999);
        manager.set_calibration_duty_cycle(1.7);
        manager.set_calibration_duty_cycle(-0.2);

        assert_eq!(
            *mock.sent.lock(),
            vec![
                vec![0x0A, 50],
                vec![0x0A, 99],
                vec![0x0A, 100],
                vec![0x0A, 0]
            ]
        );
    }

    #[test]
    fn duty_percent_is_clamped() {
        let (mock, manager) = setup();
        mock.emit_status(ConnectionState::Connected);
        manager.set_calibration_duty_percent(42);
        manager.set_calibration_duty_percent(250);
        assert_eq!(*mock.sent.lock(), vec![vec![0x0A, 42], vec![0x0A, 100]]);
    }

    #[test]
    fn percent_conversion_truncates_and_clamps() {
        assert_eq!(duty_cycle_percent(0.0), 0);
        assert_eq!(duty_cycle_percent(0.25), 25);
        assert_eq!(duty_cycle_percent(0.509), 50);
        assert_eq!(duty_cycle_percent(1.0), 100);
        assert_eq!(duty_cycle_percent(f32::NAN), 0);
    }

    #[test]
    fn connect_and_disconnect_are_forwarded() {
        let (mock, manager) = setup();
        manager.connect("tcp://127.0.0.1:9");
        manager.disconnect();
        assert_eq!(*mock.connects.lock(), vec!["tcp://127.0.0.1:9".to_string()]);
        assert_eq!(*mock.disconnects.lock(), 1);
    }

    #[test]
    fn drop_disconnects_and_detaches() {
        let (mock, manager) = setup();
        drop(manager);
        assert_eq!(*mock.disconnects.lock(), 1);
        assert!(mock.listener.lock().is_none());
    }
}
