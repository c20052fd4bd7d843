use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serlink_frame::{DecodedFrame, FrameCodec};
use serlink_transport::{ConnectCanceller, LinkAddress, LinkStream, TransportError};
use tracing::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::listener::{in_dispatch, DispatchGuard, TransceiverListener};
use crate::ring_buffer::RingBuffer;
use crate::state::ConnectionState;
use crate::transceiver::{SendStatus, Transceiver};

/// [`Transceiver`] over a [`LinkStream`] (RFCOMM, TCP or Unix socket).
///
/// Each connection runs three named threads:
/// - *connector* establishes the link, then starts the other two
/// - *reader* reads one byte at a time, decodes, and delivers frames
/// - *writer* drains the transmit buffer onto the link
///
/// `disconnect` shuts the link down, which unblocks the reader and writer,
/// and joins them before returning. A pending connect is cancelled too: on
/// Linux its socket is shut down and the connector joined, elsewhere the
/// attempt is abandoned and its link closed as soon as the platform call
/// returns.
pub struct LinkTransceiver {
    shared: Arc<Shared>,
}

struct Shared {
    config: LinkConfig,
    /// Serializes connect, disconnect and state transitions. Reentrant so
    /// listeners may call back into the transceiver from a callback.
    control: ReentrantMutex<()>,
    state: Mutex<ConnectionState>,
    listener: RwLock<Option<Arc<dyn TransceiverListener>>>,
    codec: Mutex<Option<FrameCodec>>,
    tx: RingBuffer,
    /// Bytes the writer has handed to the link, across all sessions.
    written: AtomicU64,
    session: Mutex<Option<Arc<Session>>>,
}

/// One connection attempt and the threads serving it.
struct Session {
    running: AtomicBool,
    canceller: ConnectCanceller,
    /// Handle kept only to shut the link down.
    link: Mutex<Option<LinkStream>>,
    connector: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            canceller: ConnectCanceller::new(),
            link: Mutex::new(None),
            connector: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the session, cancel a pending connect and shut the link down.
    /// Returns true only for the call that actually stopped it.
    fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.canceller.cancel();
        if let Some(link) = self.link.lock().take() {
            if let Err(err) = link.shutdown() {
                debug!(error = %err, "link shutdown failed");
            }
        }
        true
    }

    /// Hand the established link to the session. Refused once stopped.
    fn install(&self, link: LinkStream) -> bool {
        let mut slot = self.link.lock();
        if !self.is_running() {
            return false;
        }
        *slot = Some(link);
        true
    }

    /// Wait for the session's threads to exit.
    ///
    /// Skipped inside a listener callback, where the calling thread may be
    /// one of the workers; those threads exit on their own once stopped.
    fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        let connector = self.connector.lock().take();
        if in_dispatch() {
            return;
        }

        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "link thread panicked");
            }
        }
        if let Some(handle) = connector {
            let joinable =
                ConnectCanceller::interrupts_pending_connect() || handle.is_finished();
            if joinable && handle.thread().id() != current && handle.join().is_err() {
                error!(thread = "serlink-connector", "link thread panicked");
            }
        }
    }
}

impl Default for LinkTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkTransceiver {
    /// Create a transceiver with [`LinkConfig::default`].
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let tx = RingBuffer::new(config.tx_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                control: ReentrantMutex::new(()),
                state: Mutex::new(ConnectionState::NotConnected),
                listener: RwLock::new(None),
                codec: Mutex::new(None),
                tx,
                written: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Bytes queued but not yet written to the link.
    pub fn tx_bytes_pending(&self) -> usize {
        self.shared.tx.bytes_available()
    }

    /// Bytes discarded so far because the transmit buffer was full.
    pub fn tx_dropped_bytes(&self) -> u64 {
        self.shared.tx.dropped_bytes()
    }

    /// Bytes written and flushed to the link since creation.
    pub fn tx_bytes_written(&self) -> u64 {
        self.shared.written.load(Ordering::SeqCst)
    }
}

impl Transceiver for LinkTransceiver {
    fn connect(&self, address: &str) {
        let shared = &self.shared;
        let previous = {
            let _control = shared.control.lock();
            let state = shared.status();
            if state != ConnectionState::NotConnected {
                warn!(address, %state, "connect ignored, link is busy");
                return;
            }

            let previous = shared.session.lock().take();
            if let Some(previous) = &previous {
                shared.stop_session(previous);
            }
            shared.tx.clear();
            if let Some(codec) = shared.codec.lock().as_mut() {
                codec.reset();
            }

            let session = Arc::new(Session::new());
            *shared.session.lock() = Some(Arc::clone(&session));
            info!(address, "connecting");
            shared.update_state(ConnectionState::Connecting);

            // A listener may have disconnected from inside the callback.
            if session.is_running() {
                let spawned = {
                    let shared = Arc::clone(shared);
                    let session = Arc::clone(&session);
                    let address = address.to_string();
                    thread::Builder::new()
                        .name("serlink-connector".into())
                        .spawn(move || run_connector(shared, session, address))
                };
                match spawned {
                    Ok(handle) => *session.connector.lock() = Some(handle),
                    Err(err) => {
                        error!(error = %err, "failed to spawn connector thread");
                        shared.link_lost(&session);
                    }
                }
            }
            previous
        };

        if let Some(previous) = previous {
            previous.join();
        }
    }

    fn disconnect(&self) {
        let shared = &self.shared;
        let session = {
            let _control = shared.control.lock();
            let session = shared.session.lock().take();
            if let Some(session) = &session {
                if shared.stop_session(session) {
                    info!("disconnected");
                }
            }
            shared.update_state(ConnectionState::NotConnected);
            session
        };

        if let Some(session) = session {
            session.join();
        }
    }

    fn send(&self, payload: &[u8]) -> SendStatus {
        let shared = &self.shared;
        let encoded = {
            let codec = shared.codec.lock();
            let Some(codec) = codec.as_ref() else {
                warn!("send ignored, no codec attached");
                return SendStatus::NoCodec;
            };
            codec.encode(payload)
        };

        // Held until the frame is queued, so a concurrent reconnect clears
        // it rather than carrying it into the next session.
        let session = shared.session.lock();
        let state = shared.status();
        let live = session.as_ref().is_some_and(|session| session.is_running());
        if state != ConnectionState::Connected || !live {
            warn!(%state, "send ignored, link not connected");
            return SendStatus::NotConnected;
        }

        let frame = match encoded {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "send rejected");
                return SendStatus::Rejected(err);
            }
        };

        let queued = shared.tx.push_all(&frame);
        if queued < frame.len() {
            let dropped = frame.len() - queued;
            warn!(queued, dropped, "transmit buffer overflow, bytes dropped");
            SendStatus::Overflow { queued, dropped }
        } else {
            debug!(bytes = queued, command_id = payload.first().copied(), "frame queued");
            SendStatus::Queued { bytes: queued }
        }
    }

    fn status(&self) -> ConnectionState {
        self.shared.status()
    }

    fn attach_codec(&self, codec: FrameCodec) {
        *self.shared.codec.lock() = Some(codec);
    }

    fn detach_codec(&self) {
        *self.shared.codec.lock() = None;
    }

    fn set_listener(&self, listener: Arc<dyn TransceiverListener>) {
        *self.shared.listener.write() = Some(listener);
    }

    fn clear_listener(&self) {
        *self.shared.listener.write() = None;
    }
}

impl Drop for LinkTransceiver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Shared {
    fn status(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn listener(&self) -> Option<Arc<dyn TransceiverListener>> {
        self.listener.read().clone()
    }

    /// Record a transition and notify the listener. Transitions to the
    /// current state are ignored.
    fn update_state(&self, next: ConnectionState) {
        let _control = self.control.lock();
        {
            let mut state = self.state.lock();
            if *state == next {
                return;
            }
            *state = next;
        }
        info!(state = %next, "connection state changed");

        if let Some(listener) = self.listener() {
            let _dispatch = DispatchGuard::enter();
            listener.on_status_changed(next);
        }
    }

    fn deliver(&self, frame: DecodedFrame) {
        debug!(
            command_id = frame.command_id,
            len = frame.parameters.len(),
            valid = frame.valid,
            "frame received"
        );
        if let Some(listener) = self.listener() {
            let _dispatch = DispatchGuard::enter();
            listener.on_data_received(frame);
        }
    }

    fn stop_session(&self, session: &Session) -> bool {
        let stopped = session.stop();
        self.tx.interrupt();
        stopped
    }

    /// Tear the session down after a connect or I/O failure. Only the first
    /// caller for a session reports the transition.
    fn link_lost(&self, session: &Session) {
        let _control = self.control.lock();
        if self.stop_session(session) {
            self.update_state(ConnectionState::NotConnected);
        }
    }
}

fn open_link(
    config: &LinkConfig,
    address: &str,
    canceller: &ConnectCanceller,
) -> serlink_transport::Result<LinkStream> {
    let address: LinkAddress = address.parse()?;
    let link =
        serlink_transport::connect_cancellable(&address, config.connect_timeout, canceller)?;
    link.set_read_timeout(config.read_timeout)?;
    link.set_write_timeout(config.write_timeout)?;
    Ok(link)
}

fn run_connector(shared: Arc<Shared>, session: Arc<Session>, address: String) {
    let links = open_link(&shared.config, &address, &session.canceller)
        .and_then(|link| Ok((link.try_clone()?, link.try_clone()?, link)));
    let (reader_link, writer_link, link) = match links {
        Ok(links) => links,
        Err(err) => {
            if matches!(err, TransportError::Cancelled) {
                debug!(address = %address, "connect cancelled");
            } else if session.is_running() {
                error!(address = %address, error = %err, "connect failed");
            }
            shared.link_lost(&session);
            return;
        }
    };
    let transport = link.transport_name();

    let _control = shared.control.lock();
    if !session.install(link) {
        debug!(address = %address, "connect cancelled, closing link");
        return;
    }

    match spawn_workers(&shared, &session, reader_link, writer_link) {
        Ok(()) => {
            info!(address = %address, transport, "link established");
            shared.update_state(ConnectionState::Connected);
        }
        Err(err) => {
            error!(error = %err, "failed to spawn link threads");
            shared.link_lost(&session);
        }
    }
}

fn spawn_workers(
    shared: &Arc<Shared>,
    session: &Arc<Session>,
    reader_link: LinkStream,
    writer_link: LinkStream,
) -> io::Result<()> {
    let reader = {
        let shared = Arc::clone(shared);
        let session = Arc::clone(session);
        thread::Builder::new()
            .name("serlink-reader".into())
            .spawn(move || run_reader(shared, session, reader_link))?
    };
    session.workers.lock().push(reader);

    let writer = {
        let shared = Arc::clone(shared);
        let session = Arc::clone(session);
        thread::Builder::new()
            .name("serlink-writer".into())
            .spawn(move || run_writer(shared, session, writer_link))?
    };
    session.workers.lock().push(writer);
    Ok(())
}

fn run_reader(shared: Arc<Shared>, session: Arc<Session>, mut link: LinkStream) {
    debug!("reader started");
    let mut byte = [0u8; 1];
    loop {
        match link.read(&mut byte) {
            Ok(0) => {
                if session.is_running() {
                    warn!("link closed by remote device");
                }
                break;
            }
            Ok(_) => {
                let frame = {
                    let mut codec = shared.codec.lock();
                    // The codec is reset for the next session under this lock.
                    if !session.is_running() {
                        break;
                    }
                    codec.as_mut().and_then(|codec| {
                        codec.decode(byte[0]);
                        codec.take_frame()
                    })
                };
                if let Some(frame) = frame {
                    // Under control, a frame is delivered after Connected and
                    // never after the session's NotConnected.
                    let _control = shared.control.lock();
                    if !session.is_running() {
                        break;
                    }
                    shared.deliver(frame);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                if session.is_running() {
                    error!(error = %err, "link read failed");
                }
                break;
            }
        }
    }
    shared.link_lost(&session);
    debug!("reader stopped");
}

fn run_writer(shared: Arc<Shared>, session: Arc<Session>, mut link: LinkStream) {
    debug!("writer started");
    while let Some(byte) = shared.tx.pop_blocking(&session.running) {
        if let Err(err) = link.write_all(&[byte]).and_then(|()| link.flush()) {
            if session.is_running() {
                error!(error = %err, "link write failed");
            }
            break;
        }
        shared.written.fetch_add(1, Ordering::SeqCst);
    }
    shared.link_lost(&session);
    debug!("writer stopped");
}
