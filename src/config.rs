//! Client configuration
//!
//! Read from TOML, by default at `~/.config/crosstrace/config.toml`. Every
//! field is optional; missing fields take their defaults and command-line
//! flags override whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crosstrace_transport::protocol::timing;
use crosstrace_transport::SessionConfig;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Advertised name of the device to talk to
    #[serde(default)]
    pub device_name: Option<String>,
    /// Response budget per request; 0 waits forever
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Maximum bytes per GATT write
    #[serde(default = "default_write_chunk_size")]
    pub write_chunk_size: usize,
    /// Host Bluetooth adapter (0 = first)
    #[serde(default)]
    pub adapter_index: usize,
}

fn default_response_timeout_ms() -> u64 {
    5000
}
fn default_write_chunk_size() -> usize {
    timing::DEFAULT_WRITE_CHUNK
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            response_timeout_ms: default_response_timeout_ms(),
            write_chunk_size: default_write_chunk_size(),
            adapter_index: 0,
        }
    }
}

impl ClientConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crosstrace")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        if config.write_chunk_size == 0 {
            anyhow::bail!("write_chunk_size must be at least 1");
        }
        Ok(config)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        match self.response_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            response_timeout: self.response_timeout(),
        }
    }
}
