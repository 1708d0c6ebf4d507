//! Command builders
//!
//! Pure functions turning high-level device operations into request frames.
//! Every builder validates its inputs first, so nothing invalid ever reaches
//! the link. Frames carry sequence 0; the session stamps the real one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use crosstrace_transport::protocol::{group, keys, op, os, xt};
use crosstrace_transport::{Frame, Payload};

use crate::error::ValidationError;

/// Default `mx_age` for realtime queries, in seconds
pub const DEFAULT_MAX_AGE_SECS: i64 = 30;
/// Default `role_filt` for realtime queries
pub const DEFAULT_ROLE_MASK: u32 = 1;

// ============================================================================
// Fixed device commands
// ============================================================================

/// Commands that take no arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Info,
    CurrentDateTime,
    ClearKeys,
    CompressFlash,
    DownloadTeks,
    DownloadRpis,
    DownloadEncounters,
}

impl Device {
    pub const ALL: [Device; 7] = [
        Device::Info,
        Device::CurrentDateTime,
        Device::ClearKeys,
        Device::CompressFlash,
        Device::DownloadTeks,
        Device::DownloadRpis,
        Device::DownloadEncounters,
    ];

    /// (group, command id, operation)
    pub fn selector(self) -> (u8, u8, u8) {
        match self {
            Device::Info => (group::CROSSTRACE, xt::INFO, op::READ),
            Device::CurrentDateTime => (group::OS, os::DATETIME, op::READ),
            Device::ClearKeys => (group::CROSSTRACE, xt::CLEAR_KEYS, op::WRITE),
            Device::CompressFlash => (group::CROSSTRACE, xt::COMPRESS_FLASH, op::WRITE),
            Device::DownloadTeks => (group::CROSSTRACE, xt::TEKS, op::READ),
            Device::DownloadRpis => (group::CROSSTRACE, xt::RPIS, op::READ),
            Device::DownloadEncounters => (group::CROSSTRACE, xt::ENCOUNTERS, op::READ),
        }
    }
}

pub fn build_device_command(device: Device) -> Frame {
    let (group, id, operation) = device.selector();
    Frame::new(group, id, operation, Payload::new())
}

// ============================================================================
// Key downloads
// ============================================================================

/// Which key store a download reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Temporary exposure keys
    Tek,
    /// Rolling proximity identifiers
    Rpi,
    Encounter,
}

impl KeyType {
    pub fn command_id(self) -> u8 {
        match self {
            KeyType::Tek => xt::TEKS,
            KeyType::Rpi => xt::RPIS,
            KeyType::Encounter => xt::ENCOUNTERS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyType::Tek => "tek",
            KeyType::Rpi => "rpi",
            KeyType::Encounter => "encounter",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tek" | "teks" => Ok(KeyType::Tek),
            "rpi" | "rpis" => Ok(KeyType::Rpi),
            "encounter" | "encounters" => Ok(KeyType::Encounter),
            other => Err(format!("Unknown key type: {other} (expected tek, rpi or encounter)")),
        }
    }
}

/// Download keys recorded since `start_time` (unix seconds), at most `max_download`
pub fn build_key_download(
    kind: KeyType,
    start_time: i64,
    max_download: i64,
) -> Result<Frame, ValidationError> {
    if start_time < 0 {
        return Err(ValidationError::BadTimestamp(start_time));
    }
    if max_download < 0 {
        return Err(ValidationError::BadCount(max_download));
    }
    let payload = Payload::new()
        .with(keys::START_TIME, start_time)
        .with(keys::MAX_DOWNLOAD, max_download);
    Ok(Frame::new(
        group::CROSSTRACE,
        kind.command_id(),
        op::READ,
        payload,
    ))
}

// ============================================================================
// Clock
// ============================================================================

/// Check `iso` is an ISO-8601 date-time: `YYYY-MM-DDTHH:MM:SS`, optional
/// fractional seconds, optional `Z` or `±HH:MM` offset
pub fn validate_iso_datetime(iso: &str) -> Result<(), ValidationError> {
    if DateTime::parse_from_rfc3339(iso).is_ok()
        || NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
    {
        Ok(())
    } else {
        Err(ValidationError::BadDateFormat(iso.to_string()))
    }
}

/// Set the device clock; the string is sent exactly as given
pub fn build_set_time(iso: &str) -> Result<Frame, ValidationError> {
    validate_iso_datetime(iso)?;
    Ok(Frame::new(
        group::OS,
        os::DATETIME,
        op::WRITE,
        Payload::new().with(keys::DATETIME, iso),
    ))
}

// ============================================================================
// Realtime tag query
// ============================================================================

/// Ask for tags seen within `max_age_seconds`, filtered by role (1 or 2)
pub fn build_realtime_query(
    max_age_seconds: i64,
    role_mask: u32,
) -> Result<Frame, ValidationError> {
    if max_age_seconds < 0 {
        return Err(ValidationError::BadMaxAge(max_age_seconds));
    }
    if !matches!(role_mask, 1 | 2) {
        return Err(ValidationError::BadRoleMask(role_mask));
    }
    let payload = Payload::new()
        .with(keys::MAX_AGE, max_age_seconds)
        .with(keys::ROLE_FILTER, role_mask);
    Ok(Frame::new(group::CROSSTRACE, xt::REALTIME, op::READ, payload))
}

// ============================================================================
// LEDs
// ============================================================================

/// LED blink pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightPattern {
    WhiteGreen,
    WhiteRed,
    Green,
    Red,
}

impl LightPattern {
    /// Pattern used by `led` when none is given
    pub const LOCAL_DEFAULT: LightPattern = LightPattern::Red;
    /// Pattern used by `remote-led` when none is given
    pub const REMOTE_DEFAULT: LightPattern = LightPattern::WhiteGreen;

    pub fn code(self) -> u8 {
        match self {
            LightPattern::WhiteGreen => 1,
            LightPattern::WhiteRed => 2,
            LightPattern::Green => 3,
            LightPattern::Red => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LightPattern::WhiteGreen),
            2 => Some(LightPattern::WhiteRed),
            3 => Some(LightPattern::Green),
            4 => Some(LightPattern::Red),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LightPattern::WhiteGreen => "white-green",
            LightPattern::WhiteRed => "white-red",
            LightPattern::Green => "green",
            LightPattern::Red => "red",
        }
    }
}

impl fmt::Display for LightPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LightPattern {
    type Err = String;

    /// Accepts names ("white-green", "whitegreen", "white_green") or codes 1-4
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "whitegreen" => Ok(LightPattern::WhiteGreen),
            "whitered" => Ok(LightPattern::WhiteRed),
            "green" => Ok(LightPattern::Green),
            "red" => Ok(LightPattern::Red),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(LightPattern::from_code)
                .ok_or_else(|| format!("Unknown light pattern: {s}")),
        }
    }
}

pub fn build_set_local_led(pattern: LightPattern) -> Frame {
    Frame::new(
        group::CROSSTRACE,
        xt::LOCAL_LED,
        op::WRITE,
        Payload::new().with(keys::PATTERN, pattern.code()),
    )
}

/// Blink the LED of another tag, addressed by its EUID
pub fn build_set_remote_led(tag_id: u64, pattern: LightPattern) -> Frame {
    Frame::new(
        group::CROSSTRACE,
        xt::REMOTE_LED,
        op::WRITE,
        Payload::new()
            .with(keys::EUID, tag_id)
            .with(keys::PATTERN, pattern.code()),
    )
}

// ============================================================================
// Echo
// ============================================================================

pub fn build_echo(message: &str) -> Frame {
    Frame::new(
        group::OS,
        os::ECHO,
        op::WRITE,
        Payload::new().with(keys::ECHO_REQUEST, message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstrace_transport::Value;

    #[test]
    fn test_device_commands_decode_to_their_selector() {
        for device in Device::ALL {
            let frame = build_device_command(device);
            let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
            assert_eq!(decoded.selector(), device.selector(), "{:?}", device);
            assert!(decoded.payload.is_empty());
        }
    }

    #[test]
    fn test_device_table() {
        assert_eq!(Device::Info.selector(), (88, 0, 0));
        assert_eq!(Device::CurrentDateTime.selector(), (0, 4, 0));
        assert_eq!(Device::ClearKeys.selector(), (88, 3, 2));
        assert_eq!(Device::CompressFlash.selector(), (88, 7, 2));
        assert_eq!(Device::DownloadTeks.selector(), (88, 8, 0));
        assert_eq!(Device::DownloadRpis.selector(), (88, 9, 0));
        assert_eq!(Device::DownloadEncounters.selector(), (88, 2, 0));
    }

    #[test]
    fn test_key_download_payload() {
        let frame = build_key_download(KeyType::Tek, 1694140800, 10).unwrap();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.selector(), (88, 8, 0));
        let entries: Vec<_> = decoded.payload.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("sts", &Value::UInt(1694140800)),
                ("mx", &Value::UInt(10)),
            ]
        );
    }

    #[test]
    fn test_key_download_ids() {
        assert_eq!(build_key_download(KeyType::Rpi, 0, 1).unwrap().command_id, 9);
        assert_eq!(
            build_key_download(KeyType::Encounter, 0, 1).unwrap().command_id,
            2
        );
    }

    #[test]
    fn test_key_download_rejects_negative() {
        assert_eq!(
            build_key_download(KeyType::Tek, -1, 10),
            Err(ValidationError::BadTimestamp(-1))
        );
        assert_eq!(
            build_key_download(KeyType::Tek, 0, -5),
            Err(ValidationError::BadCount(-5))
        );
    }

    #[test]
    fn test_set_time_formats() {
        for ok in [
            "2021-09-08T06:50:40.737715",
            "2021-09-08T06:50:40",
            "2021-09-08T06:50:40Z",
            "2021-09-08T06:50:40.5+02:00",
        ] {
            let frame = build_set_time(ok).unwrap();
            assert_eq!(frame.selector(), (0, 4, 2));
            assert_eq!(frame.payload.get_str("datetime"), Some(ok));
        }
        for bad in ["not-a-date", "2021-09-08", "2021-13-08T06:50:40", "06:50:40"] {
            assert_eq!(
                build_set_time(bad),
                Err(ValidationError::BadDateFormat(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_realtime_query() {
        let frame = build_realtime_query(DEFAULT_MAX_AGE_SECS, DEFAULT_ROLE_MASK).unwrap();
        assert_eq!(frame.selector(), (88, 4, 0));
        assert_eq!(frame.payload.get_u64("mx_age"), Some(30));
        assert_eq!(frame.payload.get_u64("role_filt"), Some(1));
        assert!(build_realtime_query(10, 2).is_ok());
    }

    #[test]
    fn test_realtime_query_validation() {
        assert_eq!(
            build_realtime_query(30, 3),
            Err(ValidationError::BadRoleMask(3))
        );
        assert_eq!(
            build_realtime_query(30, 0),
            Err(ValidationError::BadRoleMask(0))
        );
        assert_eq!(
            build_realtime_query(-1, 1),
            Err(ValidationError::BadMaxAge(-1))
        );
    }

    #[test]
    fn test_led_pattern_codes() {
        let local = build_set_local_led(LightPattern::Red);
        assert_eq!(local.selector(), (88, 5, 2));
        assert_eq!(local.payload.get_u64("pattern"), Some(4));

        let remote = build_set_remote_led(123, LightPattern::WhiteGreen);
        assert_eq!(remote.selector(), (88, 6, 2));
        assert_eq!(remote.payload.get_u64("euid"), Some(123));
        assert_eq!(remote.payload.get_u64("pattern"), Some(1));
    }

    #[test]
    fn test_light_pattern_parse() {
        assert_eq!("red".parse::<LightPattern>(), Ok(LightPattern::Red));
        assert_eq!(
            "White_Green".parse::<LightPattern>(),
            Ok(LightPattern::WhiteGreen)
        );
        assert_eq!("2".parse::<LightPattern>(), Ok(LightPattern::WhiteRed));
        assert!("5".parse::<LightPattern>().is_err());
        assert!("blue".parse::<LightPattern>().is_err());
        assert_eq!(LightPattern::from_code(0), None);
        for code in 1..=4 {
            assert_eq!(LightPattern::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_key_type_parse() {
        assert_eq!("TEK".parse::<KeyType>(), Ok(KeyType::Tek));
        assert_eq!("encounters".parse::<KeyType>(), Ok(KeyType::Encounter));
        assert!("keys".parse::<KeyType>().is_err());
    }

    #[test]
    fn test_echo_frame() {
        let frame = build_echo("ping");
        assert_eq!(frame.selector(), (0, 0, 2));
        assert_eq!(frame.payload.get_str("d"), Some("ping"));
    }
}
