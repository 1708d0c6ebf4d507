//! Set command handlers.

use super::{CommandResult, Context};
use crosstrace_device::LightPattern;
use tracing::info;

/// Timestamp format sent for `set-time now`
const NOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Set the device clock
pub async fn set_time(ctx: &Context, time: &str) -> CommandResult {
    let iso = match time {
        "now" => chrono::Local::now().format(NOW_FORMAT).to_string(),
        other => other.to_string(),
    };
    // Validate before connecting
    crosstrace_device::command::validate_iso_datetime(&iso)?;

    let device = ctx.open_device().await?;
    let result = device.set_time(&iso).await;
    ctx.finish(device, result).await?;
    ctx.done(&format!("Device time set to {iso}"));
    Ok(())
}

/// Erase all stored keys
pub async fn clear_keys(ctx: &Context) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.clear_keys().await;
    ctx.finish(device, result).await?;
    info!("Key store cleared");
    ctx.done("Keys cleared");
    Ok(())
}

/// Compact the key store in flash
pub async fn compress_flash(ctx: &Context) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.compress_flash().await;
    ctx.finish(device, result).await?;
    ctx.done("Flash compressed");
    Ok(())
}

/// Blink this device's LED
pub async fn led(ctx: &Context, pattern: LightPattern) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.set_local_led(pattern).await;
    ctx.finish(device, result).await?;
    ctx.done(&format!("LED pattern {pattern} ({})", pattern.code()));
    Ok(())
}

/// Blink another tag's LED
pub async fn remote_led(ctx: &Context, tag_id: &str, pattern: LightPattern) -> CommandResult {
    let tag = parse_tag_id(tag_id)?;
    let device = ctx.open_device().await?;
    let result = device.set_remote_led(tag, pattern).await;
    ctx.finish(device, result).await?;
    ctx.done(&format!("Tag {tag:#x}: LED pattern {pattern} ({})", pattern.code()));
    Ok(())
}

/// Tag EUIDs are given as decimal or `0x` hex
fn parse_tag_id(s: &str) -> anyhow::Result<u64> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| anyhow::anyhow!("Invalid tag id {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_id() {
        assert_eq!(parse_tag_id("123").unwrap(), 123);
        assert_eq!(parse_tag_id("0x7B").unwrap(), 123);
        assert!(parse_tag_id("-1").is_err());
        assert!(parse_tag_id("tag").is_err());
    }

    #[test]
    fn test_now_format_is_accepted() {
        let now = chrono::Local::now().format(NOW_FORMAT).to_string();
        assert!(crosstrace_device::command::validate_iso_datetime(&now).is_ok());
    }
}
