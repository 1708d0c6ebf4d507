//! Transport, codec and session error types

use thiserror::Error;

/// Link-level errors raised by a `Transport` implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    #[error("GATT characteristic not found: {0}")]
    CharacteristicNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "bluetooth")]
impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::NotConnected => TransportError::Disconnected,
            other => TransportError::Bluetooth(other.to_string()),
        }
    }
}

/// Errors establishing a session with a device
#[derive(Error, Debug)]
pub enum ConnectError {
    /// No device with the requested name is connected at the OS level
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The device was found but the link could not be set up
    #[error("Transport initialisation failed: {0}")]
    TransportInit(#[source] TransportError),

    #[error("Session is already connected")]
    AlreadyConnected,
}

/// Errors decoding a received frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the header or declared payload length require
    #[error("Frame truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Bytes left over after the declared frame length
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
}

/// Errors encoding an outbound frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Payload too large: {0} bytes (max 65535)")]
    PayloadTooLarge(usize),

    #[error("CBOR encoding failed: {0}")]
    Cbor(String),
}

/// Errors from a request/response exchange on a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("No response within {0:?}")]
    Timeout(std::time::Duration),

    /// The session was disconnected while the request was pending
    #[error("Request cancelled")]
    Cancelled,

    #[error("Session is not connected")]
    NotConnected,

    #[error("No frame has been staged")]
    NothingStaged,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Response could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
