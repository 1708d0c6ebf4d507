//! Session manager
//!
//! `Session` owns the link to one device and adds request/response semantics
//! on top of a raw `Transport`: sequence numbering, correlation of responses
//! by sequence number, timeouts and cancellation on disconnect.
//!
//! Only one request is in flight at a time. Concurrent callers queue on the
//! `query_lock` (a FIFO tokio mutex) and are served in arrival order.
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!        ▲                         │                  │
//!        └──────────error──────────┘                  │
//!        └───────────────────disconnect()─────────────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::discovery::DeviceDiscovery;
use crate::error::{ConnectError, DecodeError, SendError};
use crate::frame::{Frame, FrameAssembler};
use crate::payload::Payload;
use crate::protocol::{group, keys, op, os};
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// Session tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Budget for `send()`; `None` waits until a response or disconnect
    pub response_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The one request awaiting a response
struct InFlight {
    sequence: u8,
    response_tx: oneshot::Sender<Result<Frame, SendError>>,
}

type InFlightSlot = Arc<Mutex<Option<InFlight>>>;

/// Everything tied to one connection
///
/// Each connection gets its own in-flight slot, so a callback left behind by
/// an old transport can never resolve a request made on a newer one.
#[derive(Clone)]
struct Link {
    transport: Arc<dyn Transport>,
    inflight: InFlightSlot,
    assembler: Arc<Mutex<FrameAssembler>>,
}

/// A request that owns the in-flight slot but has not been written yet
struct Request {
    link: Link,
    frame: Frame,
    bytes: Vec<u8>,
    response_rx: oneshot::Receiver<Result<Frame, SendError>>,
}

enum LinkState {
    Disconnected,
    Connecting,
    Connected(Link),
}

/// Connection to a single device
pub struct Session {
    state: Mutex<LinkState>,
    sequence: AtomicU8,
    query_lock: tokio::sync::Mutex<()>,
    staged: Mutex<Option<Frame>>,
    config: SessionConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            state: Mutex::new(LinkState::Disconnected),
            sequence: AtomicU8::new(0),
            query_lock: tokio::sync::Mutex::new(()),
            staged: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Connect to the OS-connected device whose name matches `name` exactly
    ///
    /// Devices are never scanned for; the platform must already hold a link.
    pub async fn connect(
        &self,
        discovery: &dyn DeviceDiscovery,
        name: &str,
    ) -> Result<(), ConnectError> {
        self.begin_connect()?;
        let result = Self::open_named(discovery, name).await;
        match result {
            Ok(transport) => self.finish_connect(transport),
            Err(e) => {
                *self.state.lock() = LinkState::Disconnected;
                Err(e)
            }
        }
    }

    /// Adopt an already-open transport
    pub fn attach(&self, transport: Arc<dyn Transport>) -> Result<(), ConnectError> {
        self.begin_connect()?;
        self.finish_connect(transport)
    }

    fn begin_connect(&self) -> Result<(), ConnectError> {
        let mut state = self.state.lock();
        match *state {
            LinkState::Disconnected => {
                *state = LinkState::Connecting;
                Ok(())
            }
            LinkState::Connecting | LinkState::Connected(_) => {
                Err(ConnectError::AlreadyConnected)
            }
        }
    }

    async fn open_named(
        discovery: &dyn DeviceDiscovery,
        name: &str,
    ) -> Result<Arc<dyn Transport>, ConnectError> {
        let devices = discovery
            .list_devices()
            .await
            .map_err(ConnectError::TransportInit)?;
        debug!("{} OS-connected device(s)", devices.len());

        let device = devices
            .into_iter()
            .find(|d| d.info.name == name)
            .ok_or_else(|| ConnectError::NotFound(name.to_string()))?;

        discovery
            .open_device(&device)
            .await
            .map_err(ConnectError::TransportInit)
    }

    fn finish_connect(&self, transport: Arc<dyn Transport>) -> Result<(), ConnectError> {
        let inflight: InFlightSlot = Arc::new(Mutex::new(None));
        let assembler = Arc::new(Mutex::new(FrameAssembler::new()));
        let slot = Arc::clone(&inflight);
        let buffer = Arc::clone(&assembler);

        let subscribed = transport.subscribe(Arc::new(move |fragment: &[u8]| {
            let frames = buffer.lock().push(fragment);
            for raw in frames {
                deliver(&slot, &raw);
            }
        }));
        if let Err(e) = subscribed {
            *self.state.lock() = LinkState::Disconnected;
            return Err(ConnectError::TransportInit(e));
        }

        info!(
            "Connected to {} ({})",
            transport.device_info().name,
            transport.device_info().address
        );
        *self.state.lock() = LinkState::Connected(Link {
            transport,
            inflight,
            assembler,
        });
        Ok(())
    }

    /// Drop the link, cancelling any pending request
    ///
    /// Safe to call in any state; a no-op when already disconnected.
    pub async fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), LinkState::Disconnected);
        let LinkState::Connected(link) = previous else {
            return;
        };

        if let Some(pending) = link.inflight.lock().take() {
            debug!("Cancelling pending request seq={}", pending.sequence);
            let _ = pending.response_tx.send(Err(SendError::Cancelled));
        }
        if let Err(e) = link.transport.close().await {
            warn!("Error closing transport: {}", e);
        }
        info!("Disconnected from {}", link.transport.device_info().name);
    }

    pub fn state(&self) -> ConnectionState {
        match *self.state.lock() {
            LinkState::Disconnected => ConnectionState::Disconnected,
            LinkState::Connecting => ConnectionState::Connecting,
            LinkState::Connected(_) => ConnectionState::Connected,
        }
    }

    /// True when connected and the underlying link still reports up
    pub async fn is_connected(&self) -> bool {
        match self.link() {
            Ok(link) => link.transport.is_connected().await,
            Err(_) => false,
        }
    }

    pub fn device_info(&self) -> Option<TransportDeviceInfo> {
        self.link()
            .ok()
            .map(|link| link.transport.device_info().clone())
    }

    fn link(&self) -> Result<Link, SendError> {
        match &*self.state.lock() {
            LinkState::Connected(link) => Ok(link.clone()),
            _ => Err(SendError::NotConnected),
        }
    }

    // ========================================================================
    // Request / response
    // ========================================================================

    /// Send a frame and wait for its response using the configured budget
    pub async fn send(&self, frame: Frame) -> Result<Frame, SendError> {
        self.exchange(frame, self.config.response_timeout).await
    }

    /// Send a frame and wait at most `budget` for its response
    pub async fn send_timeout(&self, frame: Frame, budget: Duration) -> Result<Frame, SendError> {
        self.exchange(frame, Some(budget)).await
    }

    async fn exchange(&self, frame: Frame, budget: Option<Duration>) -> Result<Frame, SendError> {
        // Fail fast rather than queueing behind other callers
        self.link()?;

        let _guard = self.query_lock.lock().await;
        let Request {
            link,
            frame,
            bytes,
            mut response_rx,
        } = self.begin_request(frame)?;
        let sequence = frame.sequence;

        debug!(">>> {}", frame);
        if let Err(e) = link.transport.write(&bytes).await {
            clear_if_pending(&link.inflight, sequence);
            // disconnect() cancels us before closing the link under the write
            if let Ok(Err(SendError::Cancelled)) = response_rx.try_recv() {
                debug!("Write for seq={} aborted by disconnect", sequence);
                return Err(SendError::Cancelled);
            }
            return Err(e.into());
        }

        let outcome = match budget {
            Some(budget) => match tokio::time::timeout(budget, response_rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    clear_if_pending(&link.inflight, sequence);
                    discard_partial(&link.assembler);
                    warn!("No response to seq={} within {:?}", sequence, budget);
                    return Err(SendError::Timeout(budget));
                }
            },
            None => response_rx.await,
        };

        // A dropped sender means the link was torn down under us
        let response = outcome.unwrap_or(Err(SendError::Cancelled))?;
        debug!("<<< {}", response);
        Ok(response)
    }

    /// Stamp the next sequence number and claim the in-flight slot
    ///
    /// Runs under the state lock, so a concurrent `disconnect()` either finds
    /// this request and cancels it or has already dropped the link. Queued
    /// callers that lost the link while waiting get `NotConnected`.
    fn begin_request(&self, frame: Frame) -> Result<Request, SendError> {
        let state = self.state.lock();
        let LinkState::Connected(link) = &*state else {
            return Err(SendError::NotConnected);
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = frame.with_sequence(sequence);
        let bytes = frame.encode()?;

        // Leftovers of an abandoned response must not prefix the next one
        discard_partial(&link.assembler);

        let (response_tx, response_rx) = oneshot::channel();
        *link.inflight.lock() = Some(InFlight {
            sequence,
            response_tx,
        });

        Ok(Request {
            link: link.clone(),
            frame,
            bytes,
            response_rx,
        })
    }

    /// Echo `message` through the device's OS management group
    pub async fn echo_raw(&self, message: &str) -> Result<String, SendError> {
        let request = Frame::new(
            group::OS,
            os::ECHO,
            op::WRITE,
            Payload::new().with(keys::ECHO_REQUEST, message),
        );
        let response = self.send(request).await?;
        response
            .payload
            .get_str(keys::ECHO_RESPONSE)
            .map(str::to_string)
            .ok_or_else(|| {
                SendError::Decode(DecodeError::InvalidPayload(format!(
                    "echo response has no \"{}\" field",
                    keys::ECHO_RESPONSE
                )))
            })
    }

    // ========================================================================
    // Staged command
    // ========================================================================

    /// Remember a frame for a later `retrieve()`
    pub fn stage(&self, frame: Frame) {
        trace!("Staged {}", frame);
        *self.staged.lock() = Some(frame);
    }

    pub fn staged(&self) -> Option<Frame> {
        self.staged.lock().clone()
    }

    /// Send the staged frame again
    ///
    /// Each retrieval gets a fresh sequence number; the staged frame stays
    /// staged so it can be retrieved repeatedly.
    pub async fn retrieve(&self) -> Result<Frame, SendError> {
        let frame = self.staged().ok_or(SendError::NothingStaged)?;
        self.send(frame).await
    }
}

/// Route one complete inbound frame to the pending request
fn deliver(slot: &Mutex<Option<InFlight>>, raw: &[u8]) {
    let decoded = Frame::decode(raw);
    let mut pending = slot.lock();

    match decoded {
        Ok(frame) => {
            let matches = pending
                .as_ref()
                .is_some_and(|p| p.sequence == frame.sequence);
            if !matches {
                match pending.as_ref() {
                    Some(p) => debug!(
                        "Dropping response seq={} (awaiting seq={})",
                        frame.sequence, p.sequence
                    ),
                    None => debug!("Dropping unsolicited frame: {}", frame),
                }
                return;
            }
            if let Some(p) = pending.take() {
                let _ = p.response_tx.send(Ok(frame));
            }
        }
        Err(e) => {
            warn!("Undecodable frame ({} bytes): {}", raw.len(), e);
            if let Some(p) = pending.take() {
                let _ = p.response_tx.send(Err(SendError::Decode(e)));
            }
        }
    }
}

fn discard_partial(assembler: &Mutex<FrameAssembler>) {
    let mut assembler = assembler.lock();
    if assembler.pending() > 0 {
        debug!("Discarding {} buffered bytes", assembler.pending());
        assembler.clear();
    }
}

fn clear_if_pending(slot: &Mutex<Option<InFlight>>, sequence: u8) {
    let mut pending = slot.lock();
    if pending.as_ref().is_some_and(|p| p.sequence == sequence) {
        pending.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use crate::protocol::xt;

    fn info_request() -> Frame {
        Frame::new(group::CROSSTRACE, xt::INFO, op::READ, Payload::new())
    }

    #[tokio::test]
    async fn test_send_when_disconnected() {
        let session = Session::default();
        assert_eq!(
            session.send(info_request()).await,
            Err(SendError::NotConnected)
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_attach_twice_rejected() {
        let session = Session::default();
        session
            .attach(Arc::new(MemoryTransport::echoing("a")))
            .unwrap();
        let again = session.attach(Arc::new(MemoryTransport::echoing("b")));
        assert!(matches!(again, Err(ConnectError::AlreadyConnected)));
        assert_eq!(session.device_info().unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = Session::default();
        session.disconnect().await;
        session
            .attach(Arc::new(MemoryTransport::echoing("a")))
            .unwrap();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_deliver_ignores_stale_sequence() {
        let slot = Mutex::new(None);
        let (tx, mut rx) = oneshot::channel();
        *slot.lock() = Some(InFlight {
            sequence: 5,
            response_tx: tx,
        });

        let stale = info_request().response(Payload::new()).with_sequence(4);
        deliver(&slot, &stale.encode().unwrap());
        assert!(slot.lock().is_some());
        assert!(rx.try_recv().is_err());

        let current = info_request().response(Payload::new()).with_sequence(5);
        deliver(&slot, &current.encode().unwrap());
        assert!(slot.lock().is_none());
        assert_eq!(rx.try_recv().unwrap().unwrap().sequence, 5);
    }

    #[test]
    fn test_deliver_decode_failure_resolves_pending() {
        let slot = Mutex::new(None);
        let (tx, mut rx) = oneshot::channel();
        *slot.lock() = Some(InFlight {
            sequence: 0,
            response_tx: tx,
        });

        // Declared length 1, payload is an integer rather than a map
        deliver(&slot, &[op::READ_RSP, 88, 0, 0, 0, 1, 0, 0, 0x01]);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(SendError::Decode(DecodeError::InvalidPayload(_)))
        ));
    }
}
