//! Frame codec
//!
//! ```text
//! ┌────┬───────┬────────┬────────┬────────┬────────┬────┬───────┬──────────────┐
//! │ op │ group │ seq_hi │ seq_lo │ len_hi │ len_lo │ id │ flags │ CBOR payload │
//! └────┴───────┴────────┴────────┴────────┴────────┴────┴───────┴──────────────┘
//!   0      1        2        3        4        5      6      7       len bytes
//! ```
//!
//! Sequence numbers are 8-bit; `seq_hi` is always written as zero and ignored
//! on decode. `flags` is written as zero and ignored on decode.

use std::fmt;

use tracing::trace;

use crate::error::{DecodeError, EncodeError};
use crate::payload::Payload;
use crate::protocol::{self, header, op};

/// One complete command or response unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub group: u8,
    pub command_id: u8,
    pub operation: u8,
    pub sequence: u8,
    pub payload: Payload,
}

impl Frame {
    /// Create a request frame with sequence 0; the session stamps the real one
    pub fn new(group: u8, command_id: u8, operation: u8, payload: Payload) -> Self {
        Self {
            group,
            command_id,
            operation,
            sequence: 0,
            payload,
        }
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    /// The (group, id, op) triple selecting a device function
    pub fn selector(&self) -> (u8, u8, u8) {
        (self.group, self.command_id, self.operation)
    }

    pub fn is_response(&self) -> bool {
        op::is_response(self.operation)
    }

    /// Management return code carried by error responses
    pub fn return_code(&self) -> Option<i64> {
        self.payload.get_i64(protocol::keys::RC)
    }

    /// Build the response a device would send for this request
    pub fn response(&self, payload: Payload) -> Self {
        Self {
            group: self.group,
            command_id: self.command_id,
            operation: op::response_to(self.operation),
            sequence: self.sequence,
            payload,
        }
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encode(
            self.group,
            self.command_id,
            self.operation,
            self.sequence,
            &self.payload,
        )
    }

    /// Parse exactly one frame from `data`
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        decode(data)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} ({}) seq={} {}",
            op::name(self.operation),
            self.group,
            self.command_id,
            protocol::command_name(self.group, self.command_id),
            self.sequence,
            self.payload
        )
    }
}

/// Encode a frame from its parts
pub fn encode(
    group: u8,
    command_id: u8,
    operation: u8,
    sequence: u8,
    payload: &Payload,
) -> Result<Vec<u8>, EncodeError> {
    let body = payload.encode()?;
    if body.len() > header::MAX_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge(body.len()));
    }
    let len = (body.len() as u16).to_be_bytes();

    let mut buf = vec![0u8; header::LEN];
    buf[header::OP] = operation;
    buf[header::GROUP] = group;
    buf[header::SEQ_HI] = 0;
    buf[header::SEQ_LO] = sequence;
    buf[header::LEN_HI] = len[0];
    buf[header::LEN_LO] = len[1];
    buf[header::ID] = command_id;
    buf[header::FLAGS] = 0;
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Declared payload length from a header, if enough bytes are present
fn payload_len(data: &[u8]) -> Option<usize> {
    if data.len() < header::LEN {
        return None;
    }
    Some(u16::from_be_bytes([data[header::LEN_HI], data[header::LEN_LO]]) as usize)
}

/// Decode exactly one frame
pub fn decode(data: &[u8]) -> Result<Frame, DecodeError> {
    let len = payload_len(data).ok_or(DecodeError::Truncated {
        needed: header::LEN,
        got: data.len(),
    })?;

    let total = header::LEN + len;
    if data.len() < total {
        return Err(DecodeError::Truncated {
            needed: total,
            got: data.len(),
        });
    }
    if data.len() > total {
        return Err(DecodeError::TrailingBytes(data.len() - total));
    }

    let payload = Payload::decode(&data[header::LEN..total])?;
    Ok(Frame {
        group: data[header::GROUP],
        command_id: data[header::ID],
        operation: data[header::OP],
        sequence: data[header::SEQ_LO],
        payload,
    })
}

/// Reassembles frames from notification fragments
///
/// BLE notifications are bounded by the link MTU, so a single frame can
/// arrive split across several notifications, and (rarely) several short
/// frames can arrive back to back in one.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered but not yet part of a complete frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a fragment and return the raw bytes of every frame it completes
    pub fn push(&mut self, fragment: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(fragment);

        let mut frames = Vec::new();
        while let Some(len) = payload_len(&self.buf) {
            let total = header::LEN + len;
            if self.buf.len() < total {
                break;
            }
            let rest = self.buf.split_off(total);
            frames.push(std::mem::replace(&mut self.buf, rest));
        }

        if !self.buf.is_empty() {
            trace!("Assembler holding {} bytes", self.buf.len());
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{group, xt};

    fn led_frame() -> Frame {
        Frame::new(
            group::CROSSTRACE,
            xt::LOCAL_LED,
            op::WRITE,
            Payload::new().with("pattern", 4u64),
        )
        .with_sequence(7)
    }

    #[test]
    fn test_header_layout() {
        let bytes = led_frame().encode().unwrap();
        let body_len = bytes.len() - header::LEN;
        assert_eq!(bytes[0], op::WRITE);
        assert_eq!(bytes[1], 88);
        assert_eq!(bytes[2], 0);
        assert_eq!(bytes[3], 7);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]) as usize, body_len);
        assert_eq!(bytes[6], xt::LOCAL_LED);
        assert_eq!(bytes[7], 0);
    }

    #[test]
    fn test_decode_matches_encoded_frame() {
        let frame = led_frame();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_empty_payload_has_zero_length() {
        let frame = Frame::new(group::CROSSTRACE, xt::INFO, op::READ, Payload::new());
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), header::LEN);
        assert_eq!(&bytes[4..6], &[0, 0]);
    }

    #[test]
    fn test_decode_truncated_header() {
        let err = decode(&[0, 88, 0, 1]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { needed: 8, got: 4 });
    }

    #[test]
    fn test_decode_truncated_payload() {
        let bytes = led_frame().encode().unwrap();
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = led_frame().encode().unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_decode_invalid_payload() {
        // header declares 1 payload byte: 0x01 is an integer, not a map
        let bytes = [op::READ_RSP, 88, 0, 0, 0, 1, 0, 0, 0x01];
        assert!(matches!(decode(&bytes), Err(DecodeError::InvalidPayload(_))));
    }

    #[test]
    fn test_decode_ignores_seq_hi_and_flags() {
        let mut bytes = led_frame().encode().unwrap();
        bytes[header::SEQ_HI] = 0x12;
        bytes[header::FLAGS] = 0x34;
        assert_eq!(decode(&bytes).unwrap().sequence, 7);
    }

    #[test]
    fn test_response_mirrors_request() {
        let rsp = led_frame().response(Payload::new().with("rc", 0u64));
        assert_eq!(rsp.operation, op::WRITE_RSP);
        assert_eq!(rsp.sequence, 7);
        assert_eq!(rsp.return_code(), Some(0));
        assert!(rsp.is_response());
    }

    #[test]
    fn test_assembler_joins_fragments() {
        let bytes = led_frame().encode().unwrap();
        let mut asm = FrameAssembler::new();
        assert!(asm.push(&bytes[..5]).is_empty());
        assert!(asm.push(&bytes[5..10]).is_empty());
        let frames = asm.push(&bytes[10..]);
        assert_eq!(frames, vec![bytes]);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn test_assembler_splits_concatenated_frames() {
        let a = led_frame().encode().unwrap();
        let b = led_frame().with_sequence(8).encode().unwrap();
        let mut joined = a.clone();
        joined.extend_from_slice(&b[..3]);

        let mut asm = FrameAssembler::new();
        assert_eq!(asm.push(&joined), vec![a]);
        assert_eq!(asm.push(&b[3..]), vec![b]);
    }
}
