//! In-memory transport and discovery
//!
//! `MemoryTransport` stands in for a device: it records every write and can
//! answer requests through a responder closure, or stay silent so the caller
//! injects notifications by hand. Used by the session and device test suites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::discovery::DeviceDiscovery;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::types::{DiscoveredDevice, NotifyCallback, TransportDeviceInfo, TransportType};
use crate::Transport;

/// Computes the device's reply to a decoded request; `None` stays silent
pub type Responder = Arc<dyn Fn(&Frame) -> Option<Frame> + Send + Sync>;

/// Transport backed by process memory
pub struct MemoryTransport {
    info: TransportDeviceInfo,
    connected: AtomicBool,
    callbacks: Mutex<Vec<NotifyCallback>>,
    responder: Mutex<Option<Responder>>,
    writes: Mutex<Vec<Vec<u8>>>,
    write_count: watch::Sender<usize>,
    notify_chunk: Option<usize>,
}

impl MemoryTransport {
    /// Create a silent transport (no automatic responses)
    pub fn new(name: &str) -> Self {
        let (write_count, _) = watch::channel(0);
        Self {
            info: TransportDeviceInfo {
                name: name.to_string(),
                address: format!("mem:{name}"),
                transport_type: TransportType::Memory,
            },
            connected: AtomicBool::new(true),
            callbacks: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            write_count,
            notify_chunk: None,
        }
    }

    /// Create a transport that answers every request via `responder`
    pub fn with_responder(
        name: &str,
        responder: impl Fn(&Frame) -> Option<Frame> + Send + Sync + 'static,
    ) -> Self {
        let transport = Self::new(name);
        transport.set_responder(responder);
        transport
    }

    /// Create a transport that echoes each request back as an empty response
    pub fn echoing(name: &str) -> Self {
        Self::with_responder(name, |req| Some(req.response(Default::default())))
    }

    /// Split every delivered notification into chunks of `size` bytes
    pub fn with_notify_chunk(mut self, size: usize) -> Self {
        self.notify_chunk = Some(size.max(1));
        self
    }

    pub fn set_responder(
        &self,
        responder: impl Fn(&Frame) -> Option<Frame> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Some(Arc::new(responder));
    }

    /// Deliver raw bytes to subscribers as if the device had notified them
    pub fn inject(&self, data: &[u8]) {
        let callbacks: Vec<NotifyCallback> = self.callbacks.lock().clone();
        let chunk = self.notify_chunk.unwrap_or(data.len().max(1));
        for piece in data.chunks(chunk) {
            for cb in &callbacks {
                cb(piece);
            }
        }
    }

    /// Encode and deliver a frame
    pub fn inject_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = frame
            .encode()
            .map_err(|e| TransportError::Internal(e.to_string()))?;
        self.inject(&bytes);
        Ok(())
    }

    /// Raw bytes of every write so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Every write decoded as a frame (undecodable writes are skipped)
    pub fn written_frames(&self) -> Vec<Frame> {
        self.writes
            .lock()
            .iter()
            .filter_map(|raw| Frame::decode(raw).ok())
            .collect()
    }

    /// Wait until at least `count` writes have happened
    pub async fn wait_for_writes(&self, count: usize) {
        let mut rx = self.write_count.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    /// Simulate the link dropping without a `close()` from our side
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.writes.lock().push(data.to_vec());
        self.write_count.send_modify(|n| *n += 1);

        // Called unlocked so a responder may replace itself
        let responder = self.responder.lock().clone();
        let reply = match Frame::decode(data) {
            Ok(request) => responder.and_then(|r| r(&request)),
            Err(e) => {
                debug!("MemoryTransport: undecodable write: {}", e);
                None
            }
        };
        if let Some(reply) = reply {
            self.inject_frame(&reply)?;
        }
        Ok(())
    }

    fn subscribe(&self, callback: NotifyCallback) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.callbacks.lock().push(callback);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.callbacks.lock().clear();
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

/// Discovery over a fixed set of in-memory devices
#[derive(Default)]
pub struct MemoryDiscovery {
    devices: Vec<Arc<MemoryTransport>>,
    fail_open: bool,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, transport: Arc<MemoryTransport>) -> Self {
        self.devices.push(transport);
        self
    }

    /// Make `open_device()` fail, simulating a link that cannot be set up
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[async_trait]
impl DeviceDiscovery for MemoryDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        Ok(self
            .devices
            .iter()
            .map(|t| DiscoveredDevice {
                info: t.device_info().clone(),
                rssi: None,
            })
            .collect())
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if self.fail_open {
            return Err(TransportError::Internal("open refused".into()));
        }
        self.devices
            .iter()
            .find(|t| t.device_info().address == device.info.address)
            .map(|t| Arc::clone(t) as Arc<dyn Transport>)
            .ok_or(TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::protocol::{group, op, xt};

    #[tokio::test]
    async fn test_responder_replies_through_callbacks() {
        let t = MemoryTransport::echoing("xt-1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        t.subscribe(Arc::new(move |b: &[u8]| sink.lock().push(b.to_vec())))
            .unwrap();

        let req =
            Frame::new(group::CROSSTRACE, xt::INFO, op::READ, Payload::new()).with_sequence(3);
        t.write(&req.encode().unwrap()).await.unwrap();

        let replies = seen.lock().clone();
        assert_eq!(replies.len(), 1);
        let rsp = Frame::decode(&replies[0]).unwrap();
        assert_eq!(rsp.operation, op::READ_RSP);
        assert_eq!(rsp.sequence, 3);
    }

    #[tokio::test]
    async fn test_responder_can_replace_itself() {
        let t = Arc::new(MemoryTransport::new("xt-1"));
        let weak = Arc::downgrade(&t);
        t.set_responder(move |req| {
            if let Some(t) = weak.upgrade() {
                t.set_responder(|_| None);
            }
            Some(req.response(Payload::new()))
        });
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        t.subscribe(Arc::new(move |_: &[u8]| *sink.lock() += 1))
            .unwrap();

        let req = Frame::new(group::CROSSTRACE, xt::INFO, op::READ, Payload::new());
        t.write(&req.encode().unwrap()).await.unwrap();
        t.write(&req.encode().unwrap()).await.unwrap();

        // First write answered, second met the replacement and stayed silent
        assert_eq!(*count.lock(), 1);
        assert_eq!(t.written().len(), 2);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let t = MemoryTransport::new("xt-1");
        t.close().await.unwrap();
        assert_eq!(t.write(&[0]).await, Err(TransportError::Disconnected));
        assert!(!t.is_connected().await);
    }
}
