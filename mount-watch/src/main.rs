// SPDX-License-Identifier: GPL-3.0-only

//! mount-watch - list storage devices known to UDisks and follow their changes

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use mount_types::DeviceInfo;
use mount_udisks::{DeviceEvent, ManagerConfig, MountManager};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "mount-watch")]
#[command(about = "List storage devices and follow add/remove/change events")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the current devices and exit
    #[arg(long)]
    once: bool,

    /// Print devices as JSON lines
    #[arg(long)]
    json: bool,
}

fn print_device(prefix: &str, info: &DeviceInfo, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(info)?);
    } else {
        println!(
            "{prefix:<10} {:<12} {:<24} {:>10}  {}",
            info.dev_file,
            info.display_name(),
            info.size_string(),
            info.mount_path.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn event_name(event: &DeviceEvent) -> &'static str {
    match event {
        DeviceEvent::Added(_) => "added",
        DeviceEvent::Removed(_) => "removed",
        DeviceEvent::Changed(_) => "changed",
        DeviceEvent::Mounted(_) => "mounted",
        DeviceEvent::Unmounted(_) => "unmounted",
        DeviceEvent::Error { .. } => "error",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mount_udisks=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::default(),
    };

    let mut manager = MountManager::system(config).await;
    match manager.backend() {
        Some(kind) => tracing::info!("Watching devices through {kind}"),
        None => tracing::warn!("No device service available"),
    }

    for device in manager.devices() {
        print_device("present", &device.info(), cli.json)?;
    }

    if cli.once {
        return Ok(());
    }

    let mut events = manager.subscribe();
    let json = cli.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let DeviceEvent::Error { device, message } = &event {
                tracing::error!("{}: {message}", device.path());
                continue;
            }
            if let Err(e) = print_device(event_name(&event), &event.device().info(), json) {
                tracing::error!("Failed to print event: {e}");
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            more = manager.process_next() => {
                if !more {
                    break;
                }
            }
        }
    }

    // The event stream closes once the manager and every queued device are
    // gone, so the printer finishes after the last pending event.
    drop(manager);
    if let Err(e) = printer.await {
        tracing::error!("Event printer failed: {e}");
    }
    Ok(())
}
