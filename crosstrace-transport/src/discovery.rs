//! Device discovery for crosstrace devices

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::DiscoveredDevice;
use crate::Transport;

/// Device discovery abstraction
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// List devices the platform currently holds a link to
    ///
    /// No scanning happens here; devices must already be connected (paired
    /// and linked by the OS Bluetooth stack).
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a specific device
    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

#[cfg(feature = "bluetooth")]
pub use self::bluetooth::BleDiscovery;

#[cfg(feature = "bluetooth")]
mod bluetooth {
    use std::sync::Arc;

    use async_trait::async_trait;
    use btleplug::api::{Central, Manager as _, Peripheral as _};
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use tracing::{debug, info};

    use super::DeviceDiscovery;
    use crate::ble::BleTransport;
    use crate::error::TransportError;
    use crate::printer::{PrinterConfig, PrinterTransport};
    use crate::protocol::timing;
    use crate::types::{DiscoveredDevice, TransportDeviceInfo, TransportType};
    use crate::Transport;

    /// Discovery of BLE peripherals already connected to the host
    pub struct BleDiscovery {
        /// Which host adapter to use (0 = first)
        adapter_index: usize,
        /// Maximum bytes per GATT write
        write_chunk: usize,
        /// Optional printer config for monitoring mode - wraps transports automatically
        printer_config: Option<PrinterConfig>,
    }

    impl Default for BleDiscovery {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BleDiscovery {
        pub fn new() -> Self {
            Self {
                adapter_index: 0,
                write_chunk: timing::DEFAULT_WRITE_CHUNK,
                printer_config: None,
            }
        }

        pub fn with_adapter(mut self, index: usize) -> Self {
            self.adapter_index = index;
            self
        }

        pub fn with_write_chunk(mut self, size: usize) -> Self {
            self.write_chunk = size;
            self
        }

        /// All transports opened via open_device() will be wrapped with a printer
        pub fn with_printer_config(mut self, config: PrinterConfig) -> Self {
            self.printer_config = Some(config);
            self
        }

        async fn adapter(&self) -> Result<Adapter, TransportError> {
            let manager = Manager::new().await?;
            let adapters = manager.adapters().await?;
            debug!("{} Bluetooth adapter(s)", adapters.len());
            adapters
                .into_iter()
                .nth(self.adapter_index)
                .ok_or(TransportError::NoAdapter)
        }

        /// Connected peripherals with their advertised names
        async fn connected_peripherals(
            &self,
            adapter: &Adapter,
        ) -> Result<Vec<(Peripheral, DiscoveredDevice)>, TransportError> {
            let mut found = Vec::new();
            for peripheral in adapter.peripherals().await? {
                if !peripheral.is_connected().await? {
                    continue;
                }
                let Some(props) = peripheral.properties().await? else {
                    continue;
                };
                let Some(name) = props.local_name else {
                    continue;
                };
                let device = DiscoveredDevice {
                    info: TransportDeviceInfo {
                        name,
                        address: peripheral.address().to_string(),
                        transport_type: TransportType::Bluetooth,
                    },
                    rssi: props.rssi,
                };
                found.push((peripheral, device));
            }
            Ok(found)
        }
    }

    #[async_trait]
    impl DeviceDiscovery for BleDiscovery {
        async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
            let adapter = self.adapter().await?;
            let devices: Vec<DiscoveredDevice> = self
                .connected_peripherals(&adapter)
                .await?
                .into_iter()
                .map(|(_, d)| d)
                .collect();
            for d in &devices {
                debug!("Connected peripheral: {} ({})", d.info.name, d.info.address);
            }
            Ok(devices)
        }

        async fn open_device(
            &self,
            device: &DiscoveredDevice,
        ) -> Result<Arc<dyn Transport>, TransportError> {
            let adapter = self.adapter().await?;
            let peripheral = self
                .connected_peripherals(&adapter)
                .await?
                .into_iter()
                .find(|(_, d)| d.info.address == device.info.address)
                .map(|(p, _)| p)
                .ok_or(TransportError::Disconnected)?;

            info!("Opening {} ({})", device.info.name, device.info.address);
            let transport: Arc<dyn Transport> = Arc::new(
                BleTransport::open(peripheral, device.info.clone(), self.write_chunk).await?,
            );

            Ok(match &self.printer_config {
                Some(config) => PrinterTransport::wrap(transport, config.clone()),
                None => transport,
            })
        }
    }
}
