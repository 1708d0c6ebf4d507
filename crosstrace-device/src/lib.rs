//! High-level command interface for crosstrace devices
//!
//! This crate builds typed commands for xt contact-tracing tags and runs them
//! over a connected `Session` from `crosstrace-transport`.

pub mod command;
pub mod error;

pub use command::{
    build_device_command, build_echo, build_key_download, build_realtime_query,
    build_set_local_led, build_set_remote_led, build_set_time, Device, KeyType, LightPattern,
    DEFAULT_MAX_AGE_SECS, DEFAULT_ROLE_MASK,
};
pub use error::{DeviceError, ValidationError};

use std::sync::Arc;

use crosstrace_transport::protocol::{self, keys, op};
use crosstrace_transport::{DeviceDiscovery, Frame, Payload, Session, SessionConfig};
use tracing::debug;

/// Typed operations on one connected device
pub struct DeviceInterface {
    session: Arc<Session>,
}

impl DeviceInterface {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Open a fresh session to the OS-connected device named `name`
    pub async fn connect(
        discovery: &dyn DeviceDiscovery,
        name: &str,
        config: SessionConfig,
    ) -> Result<Self, DeviceError> {
        let session = Arc::new(Session::new(config));
        session.connect(discovery, name).await?;
        Ok(Self::new(session))
    }

    /// Get the underlying session
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // === Device Info ===

    /// Device information map, as reported by the firmware
    pub async fn info(&self) -> Result<Payload, DeviceError> {
        let rsp = self.request(build_device_command(Device::Info)).await?;
        Ok(rsp.payload)
    }

    /// Device clock as an ISO-8601 string
    pub async fn current_datetime(&self) -> Result<String, DeviceError> {
        let rsp = self
            .request(build_device_command(Device::CurrentDateTime))
            .await?;
        rsp.payload
            .get_str(keys::DATETIME)
            .map(str::to_string)
            .ok_or_else(|| {
                DeviceError::UnexpectedResponse("datetime response has no \"datetime\"".into())
            })
    }

    pub async fn set_time(&self, iso: &str) -> Result<(), DeviceError> {
        self.request(build_set_time(iso)?).await?;
        Ok(())
    }

    // === Key Store ===

    /// Erase all stored keys
    pub async fn clear_keys(&self) -> Result<(), DeviceError> {
        self.request(build_device_command(Device::ClearKeys)).await?;
        Ok(())
    }

    pub async fn compress_flash(&self) -> Result<(), DeviceError> {
        self.request(build_device_command(Device::CompressFlash))
            .await?;
        Ok(())
    }

    /// Download keys of `kind` recorded since `start_time` (unix seconds)
    pub async fn download_keys(
        &self,
        kind: KeyType,
        start_time: i64,
        max_download: i64,
    ) -> Result<Payload, DeviceError> {
        let frame = build_key_download(kind, start_time, max_download)?;
        let rsp = self.request(frame).await?;
        debug!("Downloaded {} {} entries", rsp.payload.len(), kind);
        Ok(rsp.payload)
    }

    // === Tags ===

    /// Tags seen within `max_age_seconds`, filtered by role
    pub async fn realtime_tags(
        &self,
        max_age_seconds: i64,
        role_mask: u32,
    ) -> Result<Payload, DeviceError> {
        let rsp = self
            .request(build_realtime_query(max_age_seconds, role_mask)?)
            .await?;
        Ok(rsp.payload)
    }

    // === LEDs ===

    pub async fn set_local_led(&self, pattern: LightPattern) -> Result<(), DeviceError> {
        self.request(build_set_local_led(pattern)).await?;
        Ok(())
    }

    /// Blink the LED on another tag by EUID
    pub async fn set_remote_led(
        &self,
        tag_id: u64,
        pattern: LightPattern,
    ) -> Result<(), DeviceError> {
        self.request(build_set_remote_led(tag_id, pattern)).await?;
        Ok(())
    }

    // === Utility ===

    pub async fn echo(&self, message: &str) -> Result<String, DeviceError> {
        Ok(self.session.echo_raw(message).await?)
    }

    /// Send an arbitrary request, checking only the response header and rc
    pub async fn raw(&self, frame: Frame) -> Result<Frame, DeviceError> {
        self.request(frame).await
    }

    /// Send the most recent request again
    pub async fn resend_last(&self) -> Result<Frame, DeviceError> {
        let rsp = self.session.retrieve().await?;
        check_status(&rsp)?;
        Ok(rsp)
    }

    async fn request(&self, frame: Frame) -> Result<Frame, DeviceError> {
        let expected = (
            frame.group,
            frame.command_id,
            op::response_to(frame.operation),
        );
        self.session.stage(frame.clone());
        let rsp = self.session.send(frame).await?;

        if rsp.selector() != expected {
            return Err(DeviceError::UnexpectedResponse(format!(
                "expected {}/{} op {}, got {}",
                expected.0, expected.1, expected.2, rsp
            )));
        }
        check_status(&rsp)?;
        Ok(rsp)
    }
}

/// Fail on a non-zero management return code
fn check_status(rsp: &Frame) -> Result<(), DeviceError> {
    match rsp.return_code() {
        Some(0) | None => Ok(()),
        Some(rc) => Err(DeviceError::Status {
            command: protocol::command_name(rsp.group, rsp.command_id),
            rc,
        }),
    }
}
