//! crosstrace CLI
//!
//! A command-line client for crosstrace contact-tracing tags over BLE.

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crosstrace::ClientConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;
use commands::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                ["crosstrace", "crosstrace_transport", "crosstrace_device"]
                    .map(|target| format!("{target}={default_level}"))
                    .join(","),
            )
        }))
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut config = ClientConfig::load(&config_path)?;
    debug!("Loaded config from {}", config_path.display());

    // Command-line flags win over the config file
    if let Some(device) = cli.device.clone() {
        config.device_name = Some(device);
    }
    if let Some(secs) = cli.timeout {
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("--timeout must be a non-negative number of seconds");
        }
        config.response_timeout_ms = (secs * 1000.0).round() as u64;
    }

    // Create printer config if monitoring is enabled
    let printer_config =
        commands::create_printer_config(cli.monitor, cli.hex, cli.json, cli.filter.as_deref())?;

    let ctx = Context {
        config,
        printer_config,
        json: cli.json,
    };

    match cli.command {
        // === Discovery ===
        Commands::List => commands::query::list(&ctx).await?,

        // === Query Commands ===
        Commands::Info => commands::query::info(&ctx).await?,
        Commands::Time => commands::query::time(&ctx).await?,
        Commands::Download { kind, since, max } => {
            commands::query::download(&ctx, kind, &since, max).await?
        }
        Commands::Realtime { max_age, role } => {
            commands::query::realtime(&ctx, max_age, role).await?
        }

        // === Set Commands ===
        Commands::SetTime { time } => commands::set::set_time(&ctx, &time).await?,
        Commands::ClearKeys => commands::set::clear_keys(&ctx).await?,
        Commands::CompressFlash => commands::set::compress_flash(&ctx).await?,
        Commands::Led { pattern } => commands::set::led(&ctx, pattern).await?,
        Commands::RemoteLed { tag_id, pattern } => {
            commands::set::remote_led(&ctx, &tag_id, pattern).await?
        }

        // === Utility Commands ===
        Commands::Echo { message } => commands::utility::echo(&ctx, &message).await?,
        Commands::Raw {
            group,
            id,
            op,
            payload,
        } => commands::utility::raw(&ctx, &group, &id, &op, &payload).await?,
    }

    Ok(())
}
