//! PrinterTransport middleware for monitoring link traffic
//!
//! Wraps any `Transport` and prints every frame written to or notified by the
//! device, decoded where possible. Inbound notifications are reassembled with
//! a private `FrameAssembler` so fragmented frames print once, whole.
//!
//! # Example
//!
//! ```ignore
//! use crosstrace_transport::{PrinterConfig, PrinterTransport};
//!
//! let transport = discovery.open_device(&device).await?;
//! let monitored = PrinterTransport::wrap(transport, PrinterConfig::default());
//! // Every frame is now echoed to stderr
//! ```

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use parking_lot::Mutex;

use crate::frame::{Frame, FrameAssembler};
use crate::protocol;
use crate::{NotifyCallback, Transport, TransportDeviceInfo, TransportError};

/// Output format for the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Packet filter for selective display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PacketFilter {
    #[default]
    All,
    Requests,
    Responses,
    Group(u8),
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "requests" | "request" | "req" | "tx" => Ok(Self::Requests),
            "responses" | "response" | "rsp" | "rx" => Ok(Self::Responses),
            s if s.starts_with("group=") => s["group=".len()..]
                .parse::<u8>()
                .map(Self::Group)
                .map_err(|e| format!("Invalid group: {}", e)),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// Configuration for the PrinterTransport
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show raw hex dump alongside decoded output
    pub show_hex: bool,
    /// Filter for selective display
    pub filter: PacketFilter,
    /// Output format
    pub format: OutputFormat,
}

impl PrinterConfig {
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }

    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Tx,
    Rx,
}

/// Transport middleware that prints all frames
pub struct PrinterTransport {
    inner: Arc<dyn Transport>,
    config: Arc<PrinterConfig>,
}

impl PrinterTransport {
    /// Wrap a transport with printing middleware
    pub fn wrap(transport: Arc<dyn Transport>, config: PrinterConfig) -> Arc<dyn Transport> {
        Arc::new(Self {
            inner: transport,
            config: Arc::new(config),
        })
    }
}

fn should_show(config: &PrinterConfig, dir: Direction, frame: Option<&Frame>) -> bool {
    match (&config.filter, frame) {
        (PacketFilter::All, _) => true,
        (PacketFilter::Requests, _) => dir == Direction::Tx,
        (PacketFilter::Responses, _) => dir == Direction::Rx,
        (PacketFilter::Group(g), Some(f)) => f.group == *g,
        (PacketFilter::Group(_), None) => false,
    }
}

fn print_frame(config: &PrinterConfig, dir: Direction, raw: &[u8]) {
    let decoded = Frame::decode(raw);
    if !should_show(config, dir, decoded.as_ref().ok()) {
        return;
    }

    match config.format {
        OutputFormat::Json => {
            let line = match &decoded {
                Ok(frame) => serde_json::json!({
                    "dir": if dir == Direction::Tx { "tx" } else { "rx" },
                    "op": protocol::op::name(frame.operation),
                    "group": frame.group,
                    "id": frame.command_id,
                    "seq": frame.sequence,
                    "command": protocol::command_name(frame.group, frame.command_id),
                    "payload": frame.payload,
                }),
                Err(e) => serde_json::json!({
                    "dir": if dir == Direction::Tx { "tx" } else { "rx" },
                    "error": e.to_string(),
                    "raw": hex(raw),
                }),
            };
            eprintln!("{}", line);
        }
        OutputFormat::Text => {
            let arrow = match dir {
                Direction::Tx => ">>>".cyan(),
                Direction::Rx => "<<<".green(),
            };
            match &decoded {
                Ok(frame) => {
                    let tag = match dir {
                        Direction::Tx => "REQ".cyan().bold(),
                        Direction::Rx => "RSP".green().bold(),
                    };
                    eprintln!(
                        "{} {}  {}/{} {} seq={} {}",
                        arrow,
                        tag,
                        frame.group,
                        frame.command_id,
                        protocol::command_name(frame.group, frame.command_id).yellow(),
                        frame.sequence,
                        frame.payload
                    );
                }
                Err(e) => {
                    eprintln!("{} {}  {}", arrow, "BAD".red().bold(), e);
                }
            }
        }
    }

    if config.show_hex && config.format == OutputFormat::Text {
        eprintln!("    {}  {}", "HEX".dimmed(), hex(raw));
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Transport for PrinterTransport {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        print_frame(&self.config, Direction::Tx, data);
        self.inner.write(data).await
    }

    fn subscribe(&self, callback: NotifyCallback) -> Result<(), TransportError> {
        let config = Arc::clone(&self.config);
        let assembler = Mutex::new(FrameAssembler::new());
        self.inner.subscribe(Arc::new(move |fragment: &[u8]| {
            for raw in assembler.lock().push(fragment) {
                print_frame(&config, Direction::Rx, &raw);
            }
            callback(fragment);
        }))
    }

    async fn is_connected(&self) -> bool {
        self.inner.is_connected().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.close().await
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use crate::payload::Payload;
    use crate::protocol::{group, op, xt};

    #[test]
    fn test_packet_filter_parse() {
        assert_eq!(PacketFilter::from_str("all").unwrap(), PacketFilter::All);
        assert_eq!(PacketFilter::from_str("req").unwrap(), PacketFilter::Requests);
        assert_eq!(
            PacketFilter::from_str("Responses").unwrap(),
            PacketFilter::Responses
        );
        assert_eq!(
            PacketFilter::from_str("group=88").unwrap(),
            PacketFilter::Group(88)
        );
        assert!(PacketFilter::from_str("group=300").is_err());
        assert!(PacketFilter::from_str("events").is_err());
    }

    #[test]
    fn test_group_filter_needs_decoded_frame() {
        let config = PrinterConfig::default().with_filter(PacketFilter::Group(0));
        let frame = Frame::new(group::CROSSTRACE, xt::INFO, op::READ, Payload::new());
        assert!(!should_show(&config, Direction::Tx, Some(&frame)));
        assert!(!should_show(&config, Direction::Tx, None));
    }

    #[tokio::test]
    async fn test_wrapped_transport_passes_bytes_through() {
        let inner = Arc::new(MemoryTransport::echoing("xt-1").with_notify_chunk(3));
        let printer = PrinterTransport::wrap(inner.clone(), PrinterConfig::default());

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        printer
            .subscribe(Arc::new(move |b: &[u8]| sink.lock().extend_from_slice(b)))
            .unwrap();

        let req =
            Frame::new(group::CROSSTRACE, xt::INFO, op::READ, Payload::new()).with_sequence(9);
        printer.write(&req.encode().unwrap()).await.unwrap();

        assert_eq!(inner.written().len(), 1);
        let rsp = Frame::decode(&received.lock()).unwrap();
        assert_eq!(rsp.sequence, 9);
        assert_eq!(printer.device_info().name, "xt-1");
    }
}
