// CLI definitions using clap

use clap::{Parser, Subcommand};
use crosstrace_device::{KeyType, LightPattern, DEFAULT_MAX_AGE_SECS, DEFAULT_ROLE_MASK};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crosstrace")]
#[command(author, version, about = "BLE command client for crosstrace contact-tracing tags")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Device name (exact match against OS-connected devices)
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Config file (default: ~/.config/crosstrace/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Response timeout in seconds (0 waits forever)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Enable transport monitoring (prints all frames)
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump alongside decoded output
    #[arg(long, global = true)]
    pub hex: bool,

    /// Print responses (and monitor output) as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Monitor filter (all, requests, responses, group=N)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Discovery ===
    /// List devices connected at the OS level
    #[command(visible_alias = "ls")]
    List,

    // === Query Commands ===
    /// Show device information
    #[command(visible_alias = "i")]
    Info,

    /// Read the device clock
    Time,

    /// Download stored keys
    #[command(visible_alias = "dl")]
    Download {
        /// Key store: tek, rpi or encounter
        kind: KeyType,
        /// Only keys recorded since this time (unix seconds or ISO-8601)
        #[arg(long, default_value = "0")]
        since: String,
        /// Maximum number of entries
        #[arg(long, default_value_t = 100)]
        max: i64,
    },

    /// List tags seen recently
    #[command(visible_alias = "rt")]
    Realtime {
        /// Only tags seen within this many seconds
        #[arg(long, default_value_t = DEFAULT_MAX_AGE_SECS)]
        max_age: i64,
        /// Role filter (1 or 2)
        #[arg(long, default_value_t = DEFAULT_ROLE_MASK)]
        role: u32,
    },

    // === Set Commands ===
    /// Set the device clock
    SetTime {
        /// ISO-8601 date-time, or "now" for the local clock
        time: String,
    },

    /// Erase all stored keys
    ClearKeys,

    /// Compact the key store in flash
    CompressFlash,

    /// Blink this device's LED
    Led {
        /// Pattern: white-green, white-red, green, red (or 1-4)
        #[arg(default_value_t = LightPattern::LOCAL_DEFAULT)]
        pattern: LightPattern,
    },

    /// Blink another tag's LED
    RemoteLed {
        /// Tag EUID (decimal or 0x hex)
        tag_id: String,
        /// Pattern: white-green, white-red, green, red (or 1-4)
        #[arg(default_value_t = LightPattern::REMOTE_DEFAULT)]
        pattern: LightPattern,
    },

    // === Utility Commands ===
    /// Echo a message through the device
    Echo {
        message: String,
    },

    /// Send a raw management request
    Raw {
        /// Group (decimal or 0x hex)
        group: String,
        /// Command ID (decimal or 0x hex)
        id: String,
        /// Operation: 0 read, 2 write
        op: String,
        /// Payload entries as key=value
        payload: Vec<String>,
    },
}
