//! Common types for transport layer

use std::sync::Arc;

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Bluetooth Low Energy GATT (SMP characteristic)
    Bluetooth,
    /// In-process transport, no hardware involved
    Memory,
}

/// Device identification information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDeviceInfo {
    /// Advertised device name (e.g. "xt-tag-0042")
    pub name: String,
    /// Platform address or identifier (transport-specific)
    pub address: String,
    /// Transport type
    pub transport_type: TransportType,
}

/// Device that can be opened
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Device information
    pub info: TransportDeviceInfo,
    /// Signal strength, if the platform reports one
    pub rssi: Option<i16>,
}

/// Callback invoked with the raw bytes of each inbound notification.
///
/// Runs on the transport's delivery task, so it must not block.
pub type NotifyCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;
