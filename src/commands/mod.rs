//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `query`: Read-only commands (list, info, time, download, realtime)
//! - `set`: Commands that change device state (set-time, clear-keys, led, ...)
//! - `utility`: Utility commands (echo, raw)

pub mod query;
pub mod set;
pub mod utility;

use std::str::FromStr;

use anyhow::{anyhow, Context as _};
use crosstrace::ClientConfig;
use crosstrace_device::{DeviceError, DeviceInterface};
use crosstrace_transport::{
    BleDiscovery, OutputFormat, PacketFilter, Payload, PrinterConfig,
};
use tracing::debug;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Everything a handler needs: effective config and output options
pub struct Context {
    pub config: ClientConfig,
    pub printer_config: Option<PrinterConfig>,
    pub json: bool,
}

impl Context {
    pub fn discovery(&self) -> BleDiscovery {
        let discovery = BleDiscovery::new()
            .with_adapter(self.config.adapter_index)
            .with_write_chunk(self.config.write_chunk_size);
        match &self.printer_config {
            Some(config) => discovery.with_printer_config(config.clone()),
            None => discovery,
        }
    }

    /// Connect to the configured device
    pub async fn open_device(&self) -> anyhow::Result<DeviceInterface> {
        let name = self.config.device_name.as_deref().ok_or_else(|| {
            anyhow!("No device given: pass --device or set device_name in the config file")
        })?;

        DeviceInterface::connect(&self.discovery(), name, self.config.session_config())
            .await
            .with_context(|| format!("Failed to connect to {name}"))
    }

    /// Disconnect, then hand back the operation's result
    pub async fn finish<T>(
        &self,
        device: DeviceInterface,
        result: Result<T, DeviceError>,
    ) -> anyhow::Result<T> {
        device.session().disconnect().await;
        debug!("Session closed");
        Ok(result?)
    }

    /// Print a response payload as text or JSON
    pub fn print_payload(&self, title: &str, payload: &Payload) -> CommandResult {
        if self.json {
            println!("{}", serde_json::to_string_pretty(payload)?);
            return Ok(());
        }
        println!("{title}:");
        if payload.is_empty() {
            println!("  (empty)");
        }
        for (key, value) in payload.iter() {
            println!("  {key:<12} {value}");
        }
        Ok(())
    }

    /// Print a one-line confirmation (suppressed in JSON mode)
    pub fn done(&self, message: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "ok": true }));
        } else {
            println!("{message}");
        }
    }
}

/// Create printer config from CLI flags
pub fn create_printer_config(
    monitor: bool,
    hex: bool,
    json: bool,
    filter: Option<&str>,
) -> anyhow::Result<Option<PrinterConfig>> {
    if !monitor {
        return Ok(None);
    }

    let filter = match filter {
        Some(f) => PacketFilter::from_str(f).map_err(|e| anyhow!(e))?,
        None => PacketFilter::All,
    };
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    Ok(Some(
        PrinterConfig::default()
            .with_hex(hex)
            .with_filter(filter)
            .with_format(format),
    ))
}
