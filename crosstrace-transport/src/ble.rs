//! BLE GATT transport over the SMP characteristic
//!
//! The device exposes a single characteristic inside the SMP service. Requests
//! are written to it with write-without-response, split into chunks no larger
//! than the negotiated payload; responses arrive as notifications on the same
//! characteristic and may be fragmented the same way.
//!
//! Notifications are pumped from btleplug's stream by a tokio task and handed
//! to every subscribed callback.

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::protocol::gatt;
use crate::types::{NotifyCallback, TransportDeviceInfo};
use crate::Transport;

pub fn smp_service_uuid() -> Uuid {
    Uuid::from_u128(gatt::SMP_SERVICE_UUID)
}

pub fn smp_characteristic_uuid() -> Uuid {
    Uuid::from_u128(gatt::SMP_CHARACTERISTIC_UUID)
}

/// Transport for a device reached through a BLE peripheral
pub struct BleTransport {
    peripheral: Peripheral,
    characteristic: Characteristic,
    info: TransportDeviceInfo,
    /// Maximum bytes per GATT write
    write_chunk: usize,
    callbacks: Arc<Mutex<Vec<NotifyCallback>>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Open the SMP characteristic on a peripheral and start notifications
    ///
    /// The peripheral is expected to be connected at the OS level already; a
    /// connect is only issued if btleplug reports it as disconnected.
    pub async fn open(
        peripheral: Peripheral,
        info: TransportDeviceInfo,
        write_chunk: usize,
    ) -> Result<Self, TransportError> {
        if !peripheral.is_connected().await? {
            debug!("Peripheral {} not connected, connecting", info.address);
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;

        let char_uuid = smp_characteristic_uuid();
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == char_uuid && c.service_uuid == smp_service_uuid())
            .ok_or_else(|| TransportError::CharacteristicNotFound(char_uuid.to_string()))?;

        peripheral.subscribe(&characteristic).await?;
        let mut notifications = peripheral.notifications().await?;

        let callbacks: Arc<Mutex<Vec<NotifyCallback>>> = Arc::new(Mutex::new(Vec::new()));
        let task_callbacks = Arc::clone(&callbacks);
        let handle = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != char_uuid {
                    continue;
                }
                trace!("BLE notify {} bytes", notification.value.len());
                let callbacks: Vec<NotifyCallback> = task_callbacks.lock().clone();
                for cb in &callbacks {
                    cb(&notification.value);
                }
            }
            debug!("BLE notification stream ended");
        });

        debug!(
            "Opened SMP characteristic on {} (chunk {} bytes)",
            info.name, write_chunk
        );
        Ok(Self {
            peripheral,
            characteristic,
            info,
            write_chunk: write_chunk.max(1),
            callbacks,
            notify_task: Mutex::new(Some(handle)),
        })
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        for chunk in data.chunks(self.write_chunk) {
            self.peripheral
                .write(&self.characteristic, chunk, WriteType::WithoutResponse)
                .await?;
        }
        Ok(())
    }

    fn subscribe(&self, callback: NotifyCallback) -> Result<(), TransportError> {
        if self.notify_task.lock().is_none() {
            return Err(TransportError::Disconnected);
        }
        self.callbacks.lock().push(callback);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(task) = self.notify_task.lock().take() {
            task.abort();
        }
        self.callbacks.lock().clear();

        if let Err(e) = self.peripheral.unsubscribe(&self.characteristic).await {
            warn!("Failed to unsubscribe from SMP characteristic: {}", e);
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if let Some(task) = self.notify_task.lock().take() {
            task.abort();
        }
    }
}
