//! Query (read-only) command handlers.

use super::{CommandResult, Context};
use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime};
use crosstrace_device::KeyType;
use crosstrace_transport::DeviceDiscovery;

/// List devices connected at the OS level
pub async fn list(ctx: &Context) -> CommandResult {
    let devices = ctx.discovery().list_devices().await?;

    if ctx.json {
        let entries: Vec<_> = devices
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.info.name,
                    "address": d.info.address,
                    "rssi": d.rssi,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No connected devices. Pair and connect the tag in your OS first.");
        return Ok(());
    }
    println!("Connected devices:");
    for d in &devices {
        match d.rssi {
            Some(rssi) => println!("  {:<24} {}  {} dBm", d.info.name, d.info.address, rssi),
            None => println!("  {:<24} {}", d.info.name, d.info.address),
        }
    }
    Ok(())
}

/// Show device information
pub async fn info(ctx: &Context) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.info().await;
    let info = ctx.finish(device, result).await?;
    ctx.print_payload("Device info", &info)
}

/// Read the device clock
pub async fn time(ctx: &Context) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.current_datetime().await;
    let now = ctx.finish(device, result).await?;
    if ctx.json {
        println!("{}", serde_json::json!({ "datetime": now }));
    } else {
        println!("Device time: {now}");
    }
    Ok(())
}

/// Download stored keys
pub async fn download(ctx: &Context, kind: KeyType, since: &str, max: i64) -> CommandResult {
    let start_time = parse_since(since)?;
    let device = ctx.open_device().await?;
    let result = device.download_keys(kind, start_time, max).await;
    let keys = ctx.finish(device, result).await?;
    ctx.print_payload(&format!("Downloaded {kind} keys"), &keys)
}

/// List tags seen recently
pub async fn realtime(ctx: &Context, max_age: i64, role: u32) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.realtime_tags(max_age, role).await;
    let tags = ctx.finish(device, result).await?;
    ctx.print_payload("Realtime tags", &tags)
}

/// Accept unix seconds or an ISO-8601 date-time (naive values are UTC)
pub fn parse_since(since: &str) -> anyhow::Result<i64> {
    if let Ok(secs) = since.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(since) {
        return Ok(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(since, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| anyhow!("--since must be unix seconds or ISO-8601, got {since:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("1694140800").unwrap(), 1694140800);
        assert_eq!(parse_since("2023-09-08T02:40:00Z").unwrap(), 1694140800);
        assert_eq!(parse_since("2023-09-08T02:40:00").unwrap(), 1694140800);
        assert_eq!(parse_since("2023-09-08T04:40:00+02:00").unwrap(), 1694140800);
        assert!(parse_since("yesterday").is_err());
    }
}
