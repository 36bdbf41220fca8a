//! Connection to the servo controller.
//!
//! [`ActuatorLink`] owns the transport and its [`LinkState`]. `open` starts a
//! background retry thread that keeps attempting to connect every
//! `retry_interval` until it succeeds or the link is closed. On success it
//! writes the handshake once, waits `settle_delay` for the device to boot,
//! and only then reports [`LinkState::Connected`].
//!
//! Sends never block on connection: a send while not connected is dropped,
//! and a failed write drops the transport back to `Disconnected`.

pub mod frame;
pub mod mock;
pub mod serial;

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::segment::SegmentId;
use crate::sync;

pub use frame::{decode_frame, encode_frame, FrameError};
pub use mock::{MockConnector, MockDevice};
pub use serial::{list_ports, SerialConnector};

/// Granularity of interruptible waits inside the retry thread.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),

    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("failed to spawn retry thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Byte sink for an open connection.
pub trait Transport: Write + Send {}

impl<T: Write + Send> Transport for T {}

/// Something that can open a [`Transport`] to the device.
pub trait Connector: Send + Sync {
    /// Human-readable target for logs.
    fn describe(&self) -> String;

    fn connect(&self) -> Result<Box<dyn Transport>, LinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Last attempt failed; waiting for the next retry.
    Failed,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Wait between failed connection attempts.
    pub retry_interval: Duration,
    /// Wait after the handshake before the link is usable.
    pub settle_delay: Duration,
    /// Written exactly once per successful connection.
    pub handshake: Vec<u8>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
            handshake: b"HELLO\n".to_vec(),
        }
    }
}

/// Result of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Bytes were fully written to the device.
    Sent,
    /// Link was not connected (or nothing to send); nothing written.
    Dropped,
    /// Write failed; the link is now `Disconnected`.
    Failed,
}

#[derive(Debug, Default)]
struct LinkCounters {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    handshakes: AtomicU64,
    frames_sent: AtomicU64,
    write_failures: AtomicU64,
}

/// Snapshot of link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub handshakes: u64,
    pub frames_sent: u64,
    pub write_failures: u64,
}

struct Connection {
    state: LinkState,
    transport: Option<Box<dyn Transport>>,
    /// Bumped on every successful connect.
    generation: u64,
}

struct Shared {
    connection: Mutex<Connection>,
    counters: LinkCounters,
}

impl Shared {
    fn set_state(&self, state: LinkState) {
        sync::lock(&self.connection).state = state;
    }
}

struct RetryWorker {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct ActuatorLink {
    connector: Arc<dyn Connector>,
    config: LinkConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<RetryWorker>>,
}

impl ActuatorLink {
    pub fn new(connector: Arc<dyn Connector>, config: LinkConfig) -> Self {
        Self {
            connector,
            config,
            shared: Arc::new(Shared {
                connection: Mutex::new(Connection {
                    state: LinkState::Disconnected,
                    transport: None,
                    generation: 0,
                }),
                counters: LinkCounters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        sync::lock(&self.shared.connection).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Number of connections established so far. Changes whenever the device
    /// may have been reset, even if no caller observed the link go down.
    pub fn generation(&self) -> u64 {
        sync::lock(&self.shared.connection).generation
    }

    /// State and generation read under one lock.
    pub fn status(&self) -> (LinkState, u64) {
        let connection = sync::lock(&self.shared.connection);
        (connection.state, connection.generation)
    }

    pub fn stats(&self) -> LinkStats {
        let c = &self.shared.counters;
        LinkStats {
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connect_failures: c.connect_failures.load(Ordering::Relaxed),
            handshakes: c.handshakes.load(Ordering::Relaxed),
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
            write_failures: c.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Start connecting in the background. Returns immediately.
    ///
    /// No-op while a connection is already established or being attempted.
    pub fn open(&self) -> Result<(), LinkError> {
        let mut worker = sync::lock(&self.worker);

        {
            let mut connection = sync::lock(&self.shared.connection);
            if connection.state != LinkState::Disconnected {
                debug!("open() ignored, link is {}", connection.state);
                return Ok(());
            }
            connection.state = LinkState::Connecting;
        }

        // A previous worker has already finished (it exits once connected).
        if let Some(previous) = worker.take() {
            let _ = previous.handle.join();
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let connector = Arc::clone(&self.connector);
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("actuator-link".to_string())
            .spawn(move || retry_loop(connector.as_ref(), &config, &shared, &flag))
            .map_err(|e| {
                self.shared.set_state(LinkState::Disconnected);
                LinkError::Spawn(e)
            })?;

        *worker = Some(RetryWorker { shutdown, handle });
        Ok(())
    }

    /// Write raw bytes if connected.
    pub fn send_raw(&self, message: &str) -> SendOutcome {
        let mut connection = sync::lock(&self.shared.connection);
        if connection.state != LinkState::Connected {
            return SendOutcome::Dropped;
        }
        let Some(transport) = connection.transport.as_mut() else {
            connection.state = LinkState::Disconnected;
            return SendOutcome::Dropped;
        };

        let started = Instant::now();
        match transport
            .write_all(message.as_bytes())
            .and_then(|()| transport.flush())
        {
            Ok(()) => {
                self.shared
                    .counters
                    .frames_sent
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Sent {:?} in {:?}",
                    message.trim_end(),
                    started.elapsed()
                );
                SendOutcome::Sent
            }
            Err(e) => {
                warn!("Write to {} failed: {e}, link dropped", self.connector.describe());
                self.shared
                    .counters
                    .write_failures
                    .fetch_add(1, Ordering::Relaxed);
                connection.transport = None;
                connection.state = LinkState::Disconnected;
                SendOutcome::Failed
            }
        }
    }

    /// Encode `(segment, device angle)` pairs as one frame and send it.
    pub fn send_frame(&self, pairs: &[(SegmentId, i32)]) -> SendOutcome {
        if pairs.is_empty() {
            return SendOutcome::Dropped;
        }
        self.send_raw(&encode_frame(pairs))
    }

    /// Stop retrying and release the transport. Idempotent.
    pub fn close(&self) {
        if let Some(worker) = sync::lock(&self.worker).take() {
            worker.shutdown.store(true, Ordering::SeqCst);
            if worker.handle.join().is_err() {
                warn!("Actuator link retry thread panicked");
            }
        }

        let mut connection = sync::lock(&self.shared.connection);
        if connection.transport.take().is_some() {
            info!("Closed link to {}", self.connector.describe());
        }
        connection.state = LinkState::Disconnected;
    }
}

impl Drop for ActuatorLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ActuatorLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorLink")
            .field("target", &self.connector.describe())
            .field("state", &self.state())
            .finish()
    }
}

/// Sleep for `total`, waking early if `shutdown` is set. Returns `true` when
/// interrupted.
pub(crate) fn sleep_unless(shutdown: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn connect_and_greet(
    connector: &dyn Connector,
    handshake: &[u8],
) -> Result<Box<dyn Transport>, LinkError> {
    let mut transport = connector.connect()?;
    transport
        .write_all(handshake)
        .and_then(|()| transport.flush())
        .map_err(LinkError::Handshake)?;
    Ok(transport)
}

fn retry_loop(connector: &dyn Connector, config: &LinkConfig, shared: &Shared, shutdown: &AtomicBool) {
    let target = connector.describe();
    let mut attempt: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        attempt += 1;
        shared.set_state(LinkState::Connecting);
        shared
            .counters
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);

        match connect_and_greet(connector, &config.handshake) {
            Ok(transport) => {
                shared.counters.handshakes.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Connected to {target} on attempt {attempt}, settling for {:?}",
                    config.settle_delay
                );
                if sleep_unless(shutdown, config.settle_delay) {
                    debug!("Link closed while settling");
                    return;
                }

                let mut connection = sync::lock(&shared.connection);
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                connection.transport = Some(transport);
                connection.state = LinkState::Connected;
                connection.generation += 1;
                info!("Link to {target} ready");
                return;
            }
            Err(e) => {
                shared
                    .counters
                    .connect_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Connection attempt {attempt} failed: {e}, retrying in {:?}",
                    config.retry_interval
                );
                shared.set_state(LinkState::Failed);
                if sleep_unless(shutdown, config.retry_interval) {
                    break;
                }
            }
        }
    }
    debug!("Retry loop for {target} stopped");
}
