//! Frame payloads: an ordered map of text keys to tagged values
//!
//! On the wire a payload is a CBOR map. Outbound commands only carry
//! unsigned/negative integers and strings; responses may nest arrays and maps,
//! so the decoder accepts the full set of `Value` variants.

use std::fmt;

use minicbor::data::Type;
use minicbor::encode::{self, Encoder, Write};
use minicbor::{Decoder, Encode};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{DecodeError, EncodeError};

/// Maximum nesting of arrays/maps accepted when decoding
pub const MAX_DEPTH: usize = 16;

/// A single payload value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unsigned integer
    UInt(u64),
    /// Signed integer. Non-negative values should use `UInt`; `Value::from(i64)` does this.
    Int(i64),
    /// UTF-8 text
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Payload),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        if v >= 0 {
            Value::UInt(v as u64)
        } else {
            Value::Int(v)
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Bytes(b) => write!(f, "h'{}'", hex(b)),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(m) => write!(f, "{m}"),
        }
    }
}

/// Insertion-ordered map of text keys to values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    entries: Vec<(String, Value)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, keeping the original position of an existing key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Serialize to CBOR. An empty payload encodes to zero bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        minicbor::to_vec(self).map_err(|e| EncodeError::Cbor(e.to_string()))
    }

    /// Parse a CBOR map. Zero bytes decode to an empty payload.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Ok(Self::new());
        }
        let mut d = Decoder::new(data);
        let payload = match d.datatype().map_err(invalid)? {
            Type::Map | Type::MapIndef => decode_map(&mut d, 0)?,
            other => {
                return Err(DecodeError::InvalidPayload(format!(
                    "expected map, found {other}"
                )))
            }
        };
        if d.position() != data.len() {
            return Err(DecodeError::InvalidPayload(format!(
                "{} unparsed bytes after map",
                data.len() - d.position()
            )));
        }
        Ok(payload)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k:?}: {v}")?;
        }
        f.write_str("}")
    }
}

// =============================================================================
// CBOR encoding
// =============================================================================

impl<C> Encode<C> for Value {
    fn encode<W: Write>(
        &self,
        e: &mut Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        match self {
            Value::UInt(v) => {
                e.u64(*v)?;
            }
            Value::Int(v) => {
                e.i64(*v)?;
            }
            Value::Str(s) => {
                e.str(s)?;
            }
            Value::Bool(b) => {
                e.bool(*b)?;
            }
            Value::Bytes(b) => {
                e.bytes(b)?;
            }
            Value::Array(items) => {
                e.array(items.len() as u64)?;
                for item in items {
                    item.encode(e, ctx)?;
                }
            }
            Value::Map(m) => Encode::encode(m, e, ctx)?,
        }
        Ok(())
    }
}

impl<C> Encode<C> for Payload {
    fn encode<W: Write>(
        &self,
        e: &mut Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        e.map(self.entries.len() as u64)?;
        for (k, v) in &self.entries {
            e.str(k)?;
            v.encode(e, ctx)?;
        }
        Ok(())
    }
}

// =============================================================================
// CBOR decoding
// =============================================================================

/// CBOR "break" stop code terminating indefinite-length items
const BREAK: u8 = 0xFF;

fn invalid(e: minicbor::decode::Error) -> DecodeError {
    DecodeError::InvalidPayload(e.to_string())
}

/// Consume a break byte if one is next (indefinite-length containers)
fn at_break(d: &mut Decoder<'_>) -> Result<bool, DecodeError> {
    if d.datatype().map_err(invalid)? == Type::Break {
        debug_assert_eq!(d.input().get(d.position()), Some(&BREAK));
        d.set_position(d.position() + 1);
        return Ok(true);
    }
    Ok(false)
}

fn decode_map(d: &mut Decoder<'_>, depth: usize) -> Result<Payload, DecodeError> {
    if depth >= MAX_DEPTH {
        return Err(DecodeError::InvalidPayload("nesting too deep".into()));
    }
    let len = d.map().map_err(invalid)?;
    let mut payload = Payload::new();
    let mut remaining = len;
    loop {
        match remaining {
            Some(0) => break,
            Some(ref mut n) => *n -= 1,
            None => {
                if at_break(d)? {
                    break;
                }
            }
        }
        let key = match d.datatype().map_err(invalid)? {
            Type::String => d.str().map_err(invalid)?.to_string(),
            other => {
                return Err(DecodeError::InvalidPayload(format!(
                    "map key must be text, found {other}"
                )))
            }
        };
        let value = decode_value(d, depth + 1)?;
        if payload.contains_key(&key) {
            return Err(DecodeError::InvalidPayload(format!("duplicate key {key:?}")));
        }
        payload.entries.push((key, value));
    }
    Ok(payload)
}

fn decode_array(d: &mut Decoder<'_>, depth: usize) -> Result<Vec<Value>, DecodeError> {
    if depth >= MAX_DEPTH {
        return Err(DecodeError::InvalidPayload("nesting too deep".into()));
    }
    let len = d.array().map_err(invalid)?;
    let mut items = Vec::new();
    let mut remaining = len;
    loop {
        match remaining {
            Some(0) => break,
            Some(ref mut n) => *n -= 1,
            None => {
                if at_break(d)? {
                    break;
                }
            }
        }
        items.push(decode_value(d, depth + 1)?);
    }
    Ok(items)
}

fn decode_value(d: &mut Decoder<'_>, depth: usize) -> Result<Value, DecodeError> {
    let value = match d.datatype().map_err(invalid)? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Value::UInt(d.u64().map_err(invalid)?),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => Value::Int(d.i64().map_err(invalid)?),
        Type::String => Value::Str(d.str().map_err(invalid)?.to_string()),
        Type::Bool => Value::Bool(d.bool().map_err(invalid)?),
        Type::Bytes => Value::Bytes(d.bytes().map_err(invalid)?.to_vec()),
        Type::Array | Type::ArrayIndef => Value::Array(decode_array(d, depth)?),
        Type::Map | Type::MapIndef => Value::Map(decode_map(d, depth)?),
        other => {
            return Err(DecodeError::InvalidPayload(format!(
                "unsupported value type {other}"
            )))
        }
    };
    Ok(value)
}

// =============================================================================
// JSON output
// =============================================================================

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::UInt(v) => s.serialize_u64(*v),
            Value::Int(v) => s.serialize_i64(*v),
            Value::Str(v) => s.serialize_str(v),
            Value::Bool(v) => s.serialize_bool(*v),
            Value::Bytes(v) => s.serialize_str(&hex(v)),
            Value::Array(items) => {
                let mut seq = s.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(m) => m.serialize(s),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_zero_bytes() {
        assert!(Payload::new().encode().unwrap().is_empty());
        assert!(Payload::decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_encoding_is_cbor_map() {
        let p = Payload::new().with("mx", 10u64);
        // a1 (map/1) 62 'm' 'x' 0a
        assert_eq!(p.encode().unwrap(), vec![0xA1, 0x62, b'm', b'x', 0x0A]);
    }

    #[test]
    fn test_insert_preserves_order_and_replaces() {
        let mut p = Payload::new().with("b", 1u64).with("a", 2u64);
        assert_eq!(p.insert("b", 3u64), Some(Value::UInt(1)));
        let keys: Vec<_> = p.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(p.get_u64("b"), Some(3));
    }

    #[test]
    fn test_negative_and_string_values() {
        let p = Payload::new()
            .with("neg", -5i64)
            .with("pos", 5i64)
            .with("s", "hello");
        let decoded = Payload::decode(&p.encode().unwrap()).unwrap();
        assert_eq!(decoded.get("neg"), Some(&Value::Int(-5)));
        assert_eq!(decoded.get("pos"), Some(&Value::UInt(5)));
        assert_eq!(decoded.get_str("s"), Some("hello"));
    }

    #[test]
    fn test_decode_indefinite_map_with_nested_array() {
        // {_ "r": "hi", "l": [1, 2]}
        let data = [
            0xBF, 0x61, b'r', 0x62, b'h', b'i', 0x61, b'l', 0x82, 0x01, 0x02, 0xFF,
        ];
        let p = Payload::decode(&data).unwrap();
        assert_eq!(p.get_str("r"), Some("hi"));
        assert_eq!(
            p.get("l"),
            Some(&Value::Array(vec![Value::UInt(1), Value::UInt(2)]))
        );
    }

    #[test]
    fn test_decode_rejects_non_map() {
        let err = Payload::decode(&[0x01]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_rejects_integer_keys() {
        // {1: 2}
        let err = Payload::decode(&[0xA1, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_rejects_duplicate_keys() {
        // {"a": 1, "a": 2}
        let data = [0xA2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            Payload::decode(&data),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_cut_off_map() {
        // map claims 2 entries, only one present
        let data = [0xA2, 0x61, b'a', 0x01];
        assert!(matches!(
            Payload::decode(&data),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_excessive_nesting() {
        // {"a": [[[[...]]]]} deeper than MAX_DEPTH
        let mut data = vec![0xA1, 0x61, b'a'];
        data.extend(std::iter::repeat(0x81).take(MAX_DEPTH + 1));
        data.push(0x00);
        assert!(matches!(
            Payload::decode(&data),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_json_serialization_keeps_order() {
        let p = Payload::new()
            .with("sts", 1694140800u64)
            .with("mx", 10u64);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"sts":1694140800,"mx":10}"#);
    }
}
