//! Device interface error types

use crosstrace_transport::{ConnectError, SendError};
use thiserror::Error;

/// Invalid command arguments, caught before anything is sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Start time must not be negative: {0}")]
    BadTimestamp(i64),

    #[error("Not an ISO-8601 date-time: {0:?}")]
    BadDateFormat(String),

    #[error("Role mask must be 1 or 2, got {0}")]
    BadRoleMask(u32),

    #[error("Download count must not be negative: {0}")]
    BadCount(i64),

    #[error("Max age must not be negative: {0}")]
    BadMaxAge(i64),
}

/// Errors from device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// The device answered with a non-zero management return code
    #[error("{command} failed with rc={rc}")]
    Status { command: &'static str, rc: i64 },

    /// Device returned unexpected response
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}
