//! Protocol constants for the crosstrace management protocol
//!
//! Frames follow the simple management protocol (SMP) family: a fixed 8-byte
//! header followed by a CBOR map. Groups below 64 are the standard OS groups;
//! group 88 is the crosstrace application group.

/// Management operations (low 3 bits of the header's first byte)
pub mod op {
    pub const READ: u8 = 0;
    pub const READ_RSP: u8 = 1;
    pub const WRITE: u8 = 2;
    pub const WRITE_RSP: u8 = 3;

    /// Operation a device answers `request` with
    pub fn response_to(request: u8) -> u8 {
        match request {
            READ => READ_RSP,
            WRITE => WRITE_RSP,
            other => other,
        }
    }

    pub fn is_response(op: u8) -> bool {
        matches!(op, READ_RSP | WRITE_RSP)
    }

    /// Get human-readable name for operation byte
    pub fn name(op: u8) -> &'static str {
        match op {
            READ => "READ",
            READ_RSP => "READ_RSP",
            WRITE => "WRITE",
            WRITE_RSP => "WRITE_RSP",
            _ => "UNKNOWN",
        }
    }
}

/// Management groups
pub mod group {
    /// Default OS group (echo, date-time)
    pub const OS: u8 = 0;
    /// Crosstrace application group
    pub const CROSSTRACE: u8 = 88;
}

/// Command IDs within the OS group
pub mod os {
    pub const ECHO: u8 = 0;
    pub const DATETIME: u8 = 4;
}

/// Command IDs within the crosstrace group
pub mod xt {
    pub const INFO: u8 = 0;
    pub const ENCOUNTERS: u8 = 2;
    pub const CLEAR_KEYS: u8 = 3;
    pub const REALTIME: u8 = 4;
    pub const LOCAL_LED: u8 = 5;
    pub const REMOTE_LED: u8 = 6;
    pub const COMPRESS_FLASH: u8 = 7;
    pub const TEKS: u8 = 8;
    pub const RPIS: u8 = 9;
}

/// Get human-readable name for a (group, command id) pair
pub fn command_name(group: u8, id: u8) -> &'static str {
    match (group, id) {
        (group::OS, os::ECHO) => "ECHO",
        (group::OS, os::DATETIME) => "DATETIME",
        (group::CROSSTRACE, xt::INFO) => "INFO",
        (group::CROSSTRACE, xt::ENCOUNTERS) => "ENCOUNTERS",
        (group::CROSSTRACE, xt::CLEAR_KEYS) => "CLEAR_KEYS",
        (group::CROSSTRACE, xt::REALTIME) => "REALTIME",
        (group::CROSSTRACE, xt::LOCAL_LED) => "LOCAL_LED",
        (group::CROSSTRACE, xt::REMOTE_LED) => "REMOTE_LED",
        (group::CROSSTRACE, xt::COMPRESS_FLASH) => "COMPRESS_FLASH",
        (group::CROSSTRACE, xt::TEKS) => "TEKS",
        (group::CROSSTRACE, xt::RPIS) => "RPIS",
        _ => "UNKNOWN",
    }
}

/// Frame header layout
pub mod header {
    pub const LEN: usize = 8;

    pub const OP: usize = 0;
    pub const GROUP: usize = 1;
    pub const SEQ_HI: usize = 2;
    pub const SEQ_LO: usize = 3;
    pub const LEN_HI: usize = 4;
    pub const LEN_LO: usize = 5;
    pub const ID: usize = 6;
    pub const FLAGS: usize = 7;

    /// Largest payload the 16-bit length field can describe
    pub const MAX_PAYLOAD: usize = u16::MAX as usize;
}

/// Payload keys used by the crosstrace commands
pub mod keys {
    pub const START_TIME: &str = "sts";
    pub const MAX_DOWNLOAD: &str = "mx";
    pub const DATETIME: &str = "datetime";
    pub const MAX_AGE: &str = "mx_age";
    pub const ROLE_FILTER: &str = "role_filt";
    pub const PATTERN: &str = "pattern";
    pub const EUID: &str = "euid";
    pub const ECHO_REQUEST: &str = "d";
    pub const ECHO_RESPONSE: &str = "r";
    /// Management return code, present on error responses
    pub const RC: &str = "rc";
}

/// BLE GATT identifiers for the SMP service
pub mod gatt {
    /// SMP service UUID, used as a filter before connecting
    pub const SMP_SERVICE_UUID: u128 = 0x8D53DC1D_1DB7_4CD3_868B_8A527460AA84;
    /// SMP characteristic UUID (write without response + notify)
    pub const SMP_CHARACTERISTIC_UUID: u128 = 0xDA2E7828_FBCE_4E01_AE9E_261174997C48;
}

/// Timing and sizing defaults
pub mod timing {
    /// Default write chunk size: ATT payload for the minimum 23-byte MTU
    pub const DEFAULT_WRITE_CHUNK: usize = 20;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_ops() {
        assert_eq!(op::response_to(op::READ), op::READ_RSP);
        assert_eq!(op::response_to(op::WRITE), op::WRITE_RSP);
        assert!(op::is_response(op::WRITE_RSP));
        assert!(!op::is_response(op::WRITE));
    }

    #[test]
    fn test_command_names() {
        assert_eq!(command_name(group::OS, os::DATETIME), "DATETIME");
        assert_eq!(command_name(group::CROSSTRACE, xt::TEKS), "TEKS");
        assert_eq!(command_name(7, 7), "UNKNOWN");
    }
}
