//! Transport layer for crosstrace contact-tracing devices
//!
//! This crate provides everything below the command level:
//!
//! - Frame codec (`frame`, `payload`): 8-byte header plus CBOR map payload
//! - `Transport` trait with a BLE GATT implementation (`ble`, behind the
//!   `bluetooth` feature) and an in-memory implementation (`memory`)
//! - Discovery of devices already connected at the OS level (`discovery`)
//! - `Session`: connection state machine with sequence-number correlation
//!   and one in-flight request at a time
//! - `PrinterTransport`: monitoring middleware that prints every frame
//!
//! ```text
//! [BleTransport / MemoryTransport]   ← implements Transport (raw bytes)
//!                |
//!         [PrinterTransport]          ← optional, prints decoded frames
//!                |
//!             [Session]               ← sequence numbers, correlation, cancel
//!                |
//!        [DeviceInterface / CLI]
//! ```

pub mod error;
pub mod frame;
pub mod memory;
pub mod payload;
pub mod printer;
pub mod protocol;
pub mod session;
pub mod types;

mod discovery;

#[cfg(feature = "bluetooth")]
pub mod ble;

pub use error::{ConnectError, DecodeError, EncodeError, SendError, TransportError};
pub use frame::{Frame, FrameAssembler};
pub use memory::{MemoryDiscovery, MemoryTransport};
pub use payload::{Payload, Value};
pub use printer::{OutputFormat, PacketFilter, PrinterConfig, PrinterTransport};
pub use session::{ConnectionState, Session, SessionConfig};
pub use types::{DiscoveredDevice, NotifyCallback, TransportDeviceInfo, TransportType};

pub use discovery::DeviceDiscovery;
#[cfg(feature = "bluetooth")]
pub use discovery::BleDiscovery;

use async_trait::async_trait;

/// The core transport trait - all links implement this
///
/// A transport moves raw bytes. It knows nothing about frames, sequence
/// numbers or correlation; that is the `Session`'s job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write bytes to the device
    ///
    /// Implementations may split the buffer to fit the link MTU.
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Register a callback for inbound notifications
    ///
    /// The callback receives each notification as delivered by the link, so a
    /// single frame may be split across several calls. Callbacks stay
    /// registered until the transport is closed.
    fn subscribe(&self, callback: NotifyCallback) -> Result<(), TransportError>;

    /// Check if the link is still up
    async fn is_connected(&self) -> bool;

    /// Close the link and drop all subscriptions
    async fn close(&self) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}
