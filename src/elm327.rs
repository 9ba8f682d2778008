//! ELM327 command driver.
//!
//! The driver owns up to two background threads: an initialization thread
//! that runs the AT configuration handshake, and a worker thread that drains
//! a FIFO command queue, one transport round trip per command. The thread
//! that owns the [`Elm327`] object never blocks on adapter I/O; it pumps
//! [`dispatch`](Elm327::dispatch) from its event loop, and all observer
//! callbacks fire there.
//!
//! Cross-thread handoff is an event channel plus lock-guarded queues. Each
//! background thread announces its result and is joined from the owner's
//! event handler, so joins cost only the thread-teardown tail.

use crate::constants::{at, obd, timing, PROMPT, READ_CHUNK};
use crate::error::{DriverError, InitError};
use crate::protocol::{self, Command, Completion, Protocol};
use crate::signal::Signal;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Idle,
    Initializing,
    Ready,
    Disconnecting,
}

/// State shared with the background threads.
struct Shared {
    transport: Mutex<Option<Box<dyn Transport>>>,
    pending: Mutex<VecDeque<Command>>,
    /// Paired with `pending`; signalled on enqueue and on shutdown.
    wakeup: Condvar,
    completions: Mutex<VecDeque<Completion>>,
    shutdown: AtomicBool,
    /// Negotiated protocol number, 0 while not connected.
    protocol: AtomicU8,
    error: Mutex<String>,
}

/// Wakeups delivered from the background threads to the owner's loop.
enum DriverEvent {
    InitDone(bool),
    CommandComplete,
    WorkerExit,
}

/// Command driver for ELM327-family OBD-II adapters.
///
/// `init`, `send_command` and `disconnect` all return immediately; outcomes
/// arrive through the signals while the owner pumps
/// [`dispatch`](Self::dispatch) or [`wait_dispatch`](Self::wait_dispatch).
pub struct Elm327 {
    shared: Arc<Shared>,
    events_tx: Sender<DriverEvent>,
    events_rx: Receiver<DriverEvent>,
    state: DriverState,
    init_handle: Option<JoinHandle<()>>,
    worker_handle: Option<JoinHandle<()>>,
    init_signal: Signal<bool>,
    command_signal: Signal<Completion>,
    disconnect_signal: Signal<()>,
}

impl Elm327 {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            shared: Arc::new(Shared {
                transport: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                wakeup: Condvar::new(),
                completions: Mutex::new(VecDeque::new()),
                shutdown: AtomicBool::new(false),
                protocol: AtomicU8::new(0),
                error: Mutex::new(String::new()),
            }),
            events_tx,
            events_rx,
            state: DriverState::Idle,
            init_handle: None,
            worker_handle: None,
            init_signal: Signal::new(),
            command_signal: Signal::new(),
            disconnect_signal: Signal::new(),
        }
    }

    /// Start the adapter handshake on a background thread.
    ///
    /// The outcome arrives through
    /// [`signal_init_complete`](Self::signal_init_complete); on success the
    /// command pipeline starts and the driver is `Ready`. Fails immediately
    /// if a session is already initializing or connected.
    pub fn init(&mut self, transport: impl Transport + 'static) -> Result<(), DriverError> {
        if self.state != DriverState::Idle {
            return Err(DriverError::InvalidState(
                "init while already initializing or connected",
            ));
        }

        *self.shared.transport.lock().unwrap() = Some(Box::new(transport));
        self.shared.error.lock().unwrap().clear();
        self.shared.shutdown.store(false, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        self.init_handle = Some(thread::spawn(move || init_thread(shared, events)));
        self.state = DriverState::Initializing;

        log::info!("Adapter initialization started");
        Ok(())
    }

    /// Queue one OBD request for the worker thread.
    ///
    /// Fire-and-forget: silently ignored unless the driver is `Ready`. The
    /// decoded reply arrives through
    /// [`signal_command_complete`](Self::signal_command_complete), in FIFO
    /// order with every other queued command.
    ///
    /// There is no per-command timeout; a transport read that never returns
    /// stalls the pipeline (and every queued command behind it) until
    /// [`disconnect`](Self::disconnect).
    pub fn send_command(&mut self, address: u32, service: u8, data: &[u8]) {
        if self.state != DriverState::Ready {
            log::debug!("send_command ignored while {:?}", self.state);
            return;
        }

        self.shared.pending.lock().unwrap().push_back(Command {
            address,
            service,
            data: data.to_vec(),
        });
        self.shared.wakeup.notify_one();
    }

    /// Ask the worker thread to stop and tear the session down.
    ///
    /// Returns immediately; [`signal_disconnect`](Self::signal_disconnect)
    /// fires once the worker has exited and both queues are cleared. An
    /// exchange already in flight is not aborted, only further exchanges are
    /// prevented.
    pub fn disconnect(&mut self) -> Result<(), DriverError> {
        if self.state != DriverState::Ready {
            return Err(DriverError::InvalidState(
                "disconnect while not connected or already disconnecting",
            ));
        }

        self.state = DriverState::Disconnecting;
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // Wake the worker even with an empty queue so it sees the flag.
        self.shared.wakeup.notify_one();

        log::info!("Disconnect requested");
        Ok(())
    }

    /// Observers for the boolean init outcome.
    pub fn signal_init_complete(&mut self) -> &mut Signal<bool> {
        &mut self.init_signal
    }

    /// Observers for decoded command completions.
    pub fn signal_command_complete(&mut self) -> &mut Signal<Completion> {
        &mut self.command_signal
    }

    /// Observers for disconnect completion.
    pub fn signal_disconnect(&mut self) -> &mut Signal<()> {
        &mut self.disconnect_signal
    }

    /// Process every pending driver event without blocking.
    ///
    /// Call this from the owning thread's event loop; all signal callbacks
    /// run from here.
    pub fn dispatch(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Block up to `timeout` for one driver event, then drain the rest.
    ///
    /// Returns whether anything was processed. Convenient as the body of a
    /// dedicated event loop or a test pump.
    pub fn wait_dispatch(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                self.dispatch();
                true
            }
            Err(_) => false,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_connecting(&self) -> bool {
        self.state == DriverState::Initializing
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, DriverState::Ready | DriverState::Disconnecting)
    }

    /// Whether the negotiated protocol is CAN-based.
    pub fn is_can(&self) -> bool {
        self.protocol().is_some_and(Protocol::is_can)
    }

    /// The protocol negotiated during init, while a session is alive.
    pub fn protocol(&self) -> Option<Protocol> {
        Protocol::from_number(self.shared.protocol.load(Ordering::SeqCst))
    }

    /// Description of the last initialization failure, empty if none.
    pub fn get_error_string(&self) -> String {
        self.shared.error.lock().unwrap().clone()
    }

    fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::InitDone(success) => self.init_done(success),
            DriverEvent::CommandComplete => self.command_complete(),
            DriverEvent::WorkerExit => self.worker_exit(),
        }
    }

    fn init_done(&mut self, success: bool) {
        if let Some(handle) = self.init_handle.take() {
            // The thread has already signalled; this is only the teardown tail.
            let _ = handle.join();
        }

        if success {
            self.state = DriverState::Ready;
            let shared = Arc::clone(&self.shared);
            let events = self.events_tx.clone();
            self.worker_handle = Some(thread::spawn(move || command_thread(shared, events)));
        } else {
            self.state = DriverState::Idle;
            *self.shared.transport.lock().unwrap() = None;
        }

        self.init_signal.emit(&success);
    }

    fn command_complete(&mut self) {
        // Notifications can outpace this handler; drain everything queued
        // rather than assuming one completion per event.
        loop {
            let next = self.shared.completions.lock().unwrap().pop_front();
            match next {
                Some(completion) => self.command_signal.emit(&completion),
                None => break,
            }
        }
    }

    fn worker_exit(&mut self) {
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }

        self.shared.pending.lock().unwrap().clear();
        self.shared.completions.lock().unwrap().clear();
        self.shared.protocol.store(0, Ordering::SeqCst);
        *self.shared.transport.lock().unwrap() = None;
        self.state = DriverState::Idle;

        log::info!("Adapter disconnected");
        self.disconnect_signal.emit(&());
    }
}

impl Default for Elm327 {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Elm327 {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_one();
        if let Some(handle) = self.init_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// One write-then-read-until-prompt round trip against the adapter.
///
/// Transport trouble is logged and yields whatever bytes were gathered; the
/// callers judge the reply text itself.
fn exchange(transport: &mut dyn Transport, command: &str) -> String {
    log::debug!("TX: {command:?}");

    let mut wire = command.as_bytes().to_vec();
    if !wire.ends_with(b"\r") {
        wire.push(b'\r');
    }
    if let Err(e) = transport.write(&wire) {
        log::warn!("Transport write failed: {e}");
        return String::new();
    }

    let mut reply = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match transport.read(&mut chunk) {
            Ok(0) => break, // timeout or end of stream
            Ok(n) => {
                reply.extend_from_slice(&chunk[..n]);
                if reply.contains(&b'>') {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Transport read failed: {e}");
                break;
            }
        }
    }

    let reply = String::from_utf8_lossy(&reply).into_owned();
    log::debug!("RX: {reply:?}");
    reply
}

fn init_thread(shared: Arc<Shared>, events: Sender<DriverEvent>) {
    let success = match run_init_sequence(&shared) {
        Ok(protocol) => {
            shared.protocol.store(protocol.number(), Ordering::SeqCst);
            log::info!("Adapter initialized, protocol {protocol}");
            true
        }
        Err(e) => {
            log::warn!("Adapter initialization failed: {e}");
            *shared.error.lock().unwrap() = e.to_string();
            false
        }
    };

    let _ = events.send(DriverEvent::InitDone(success));
}

/// The fixed configuration handshake: reset, echo off, headers on, protocol
/// auto-scan, broadcast probe, protocol read-back. The first failing step
/// aborts the rest.
fn run_init_sequence(shared: &Shared) -> Result<Protocol, InitError> {
    let mut guard = shared.transport.lock().unwrap();
    let transport = match guard.as_mut() {
        Some(transport) => transport.as_mut(),
        None => return Err(InitError::TransportGone),
    };

    transport.set_timeout(timing::SETUP_READ_TIMEOUT)?;
    let reply = exchange(transport, at::RESET);
    if !reply.contains(PROMPT) {
        return Err(InitError::NoResponse { command: at::RESET });
    }

    for command in [at::ECHO_OFF, at::HEADERS_ON, at::PROTOCOL_AUTO] {
        let reply = exchange(transport, command);
        if !(reply.contains("OK") && reply.contains(PROMPT)) {
            return Err(InitError::Rejected { command, reply });
        }
    }

    // The probe forces the adapter through bus negotiation, which can take
    // a while on a quiet bus.
    transport.set_timeout(timing::SCAN_READ_TIMEOUT)?;
    let reply = exchange(transport, obd::SUPPORTED_PIDS_PROBE);
    if !reply.contains(PROMPT) {
        return Err(InitError::NoResponse {
            command: obd::SUPPORTED_PIDS_PROBE,
        });
    }

    transport.set_timeout(timing::COMMAND_READ_TIMEOUT)?;
    let reply = exchange(transport, at::DESCRIBE_PROTOCOL);
    Protocol::from_dpn_reply(&reply).ok_or(InitError::Protocol { reply })
}

/// Worker thread: drain the command queue FIFO, one transport exchange per
/// command, until shutdown is requested.
fn command_thread(shared: Arc<Shared>, events: Sender<DriverEvent>) {
    let can = Protocol::from_number(shared.protocol.load(Ordering::SeqCst))
        .is_some_and(Protocol::is_can);
    // The adapter powers up targeting the engine ECU; the header is only
    // reprogrammed when a command addresses something else.
    let mut current_address = obd::DEFAULT_REQUEST_ADDRESS;

    loop {
        let next = {
            let mut pending = shared.pending.lock().unwrap();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                match pending.pop_front() {
                    Some(command) => break Some(command),
                    None => pending = shared.wakeup.wait(pending).unwrap(),
                }
            }
        };
        let Some(command) = next else { break };

        let completion = {
            let mut guard = shared.transport.lock().unwrap();
            let Some(transport) = guard.as_mut() else { break };
            run_exchange(transport.as_mut(), &command, can, &mut current_address)
        };

        shared.completions.lock().unwrap().push_back(completion);
        if events.send(DriverEvent::CommandComplete).is_err() {
            break; // owner is gone
        }
    }

    let _ = events.send(DriverEvent::WorkerExit);
}

fn run_exchange(
    transport: &mut dyn Transport,
    command: &Command,
    can: bool,
    current_address: &mut u32,
) -> Completion {
    if command.address != *current_address {
        let reply = exchange(transport, &protocol::set_header_command(command.address));
        if reply.contains("OK") && reply.contains(PROMPT) {
            *current_address = command.address;
        } else {
            // Leave the cache untouched so the next command retries.
            log::warn!("Adapter refused header 0x{:06X}", command.address);
        }
    }

    let reply = exchange(transport, &protocol::format_command(command));
    protocol::parse_reply(&reply, can)
}
