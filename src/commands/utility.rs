//! Utility command handlers.

use super::{CommandResult, Context};
use anyhow::anyhow;
use crosstrace::raw_args::{parse_payload, parse_u8};
use crosstrace_transport::protocol::{self, op};
use crosstrace_transport::Frame;

/// Echo a message through the device
pub async fn echo(ctx: &Context, message: &str) -> CommandResult {
    let device = ctx.open_device().await?;
    let result = device.echo(message).await;
    let reply = ctx.finish(device, result).await?;
    if ctx.json {
        println!("{}", serde_json::json!({ "r": reply }));
    } else {
        println!("{reply}");
    }
    Ok(())
}

/// Send a raw request and print the response
pub async fn raw(
    ctx: &Context,
    group: &str,
    id: &str,
    operation: &str,
    payload: &[String],
) -> CommandResult {
    let group = parse_u8(group).map_err(|e| anyhow!(e))?;
    let id = parse_u8(id).map_err(|e| anyhow!(e))?;
    let operation = parse_u8(operation).map_err(|e| anyhow!(e))?;
    if op::is_response(operation) || operation > op::WRITE_RSP {
        return Err(anyhow!("Operation must be 0 (read) or 2 (write)"));
    }
    let payload = parse_payload(payload).map_err(|e| anyhow!(e))?;

    let frame = Frame::new(group, id, operation, payload);
    println!(
        "Sending {} {}/{} ({})...",
        op::name(operation),
        group,
        id,
        protocol::command_name(group, id)
    );

    let device = ctx.open_device().await?;
    let result = device.raw(frame).await;
    let rsp = ctx.finish(device, result).await?;
    ctx.print_payload(
        &format!("Response {} seq={}", op::name(rsp.operation), rsp.sequence),
        &rsp.payload,
    )
}
