//! Integration tests for loading the client config file and building
//! raw requests from command-line arguments.

use std::fs::File;
use std::io::Write;
use std::time::Duration;

use crosstrace::raw_args::{parse_payload, parse_u8};
use crosstrace::ClientConfig;
use crosstrace_transport::protocol::{group, op, xt};
use crosstrace_transport::{Frame, Value};
use tempfile::tempdir;

// ── ClientConfig::load ──

#[test]
fn load_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = ClientConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn load_reads_every_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "device_name = \"xt-0042\"").unwrap();
    writeln!(file, "response_timeout_ms = 1500").unwrap();
    writeln!(file, "write_chunk_size = 180").unwrap();
    writeln!(file, "adapter_index = 1").unwrap();

    let config = ClientConfig::load(&path).unwrap();
    assert_eq!(config.device_name.as_deref(), Some("xt-0042"));
    assert_eq!(config.response_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.write_chunk_size, 180);
    assert_eq!(config.adapter_index, 1);
}

#[test]
fn load_rejects_malformed_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "device_name = ").unwrap();
    assert!(ClientConfig::load(&path).is_err());
}

// ── raw request building ──

#[test]
fn raw_args_build_encounter_request() {
    let g = parse_u8("0x58").unwrap();
    let id = parse_u8("2").unwrap();
    let payload = parse_payload(&["sts=1694140800", "mx=10"]).unwrap();
    let frame = Frame::new(g, id, op::READ, payload);

    assert_eq!(frame.selector(), (group::CROSSTRACE, xt::ENCOUNTERS, op::READ));
    assert_eq!(frame.payload.get("sts"), Some(&Value::UInt(1694140800)));

    let bytes = frame.encode().unwrap();
    let decoded = Frame::decode(&bytes).unwrap();
    assert_eq!(decoded, frame);
}
