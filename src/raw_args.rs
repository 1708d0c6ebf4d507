//! Argument parsing for the `raw` command
//!
//! `key=value` pairs become payload entries. Values are typed by shape:
//! integers (decimal or `0x` hex, optionally negative), `true`/`false`, and
//! anything else as text. Wrap a value in double quotes to force text.

use crosstrace_transport::{Payload, Value};

/// Parse a byte given as decimal or `0x`-prefixed hex
pub fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("Invalid byte {s:?}: {e}"))
}

pub fn parse_value(s: &str) -> Value {
    if let Some(text) = s.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Value::Str(text.to_string());
    }
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Some(hex) = s.strip_prefix("0x") {
        if let Ok(n) = u64::from_str_radix(hex, 16) {
            return Value::UInt(n);
        }
    }
    if let Ok(n) = s.parse::<u64>() {
        return Value::UInt(n);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::Int(n);
    }
    Value::Str(s.to_string())
}

/// Build a payload from `key=value` arguments, in order
pub fn parse_payload<S: AsRef<str>>(args: &[S]) -> Result<Payload, String> {
    let mut payload = Payload::new();
    for arg in args {
        let arg = arg.as_ref();
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got {arg:?}"))?;
        if key.is_empty() {
            return Err(format!("Empty key in {arg:?}"));
        }
        if payload.insert(key, parse_value(value)).is_some() {
            return Err(format!("Duplicate key {key:?}"));
        }
    }
    Ok(payload)
}
