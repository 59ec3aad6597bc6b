//! pmrotate Daemon - Rotates the log files of supervised processes

use anyhow::Result;
use clap::Parser;
use pmrotate_core::{constants, Config, Trigger};
use pmrotate_ipc::SupervisorClient;
use pmrotate_notify::{NotificationManager, RotationEvent};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod daemon;

use cli::Cli;
use daemon::Daemon;

const LOG_TARGETS: [&str; 5] = [
    "pmrotated",
    "pmrotate_core",
    "pmrotate_ipc",
    "pmrotate_logs",
    "pmrotate_notify",
];

fn default_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

fn log_config(config: &Config, source: Option<&Path>) {
    match source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }
    info!(
        "max_size={} bytes, worker_interval={}s, rotate_interval='{}'",
        config.max_size,
        config.worker_interval.as_secs(),
        config.rotate_cron
    );
    info!(
        "retain={}, compress={}, date_format='{}', rotate_module={}",
        config
            .retain
            .map_or_else(|| "all".to_string(), |n| n.to_string()),
        config.compress,
        config.date_format,
        config.rotate_module
    );
    match config.timezone {
        Some(tz) => info!("Timezone: {}", tz),
        None => info!("Timezone: local"),
    }
    if config.notify.is_configured() {
        if config.notify.events.is_empty() {
            info!("Alerts enabled for all events");
        } else {
            info!("Alerts enabled for: {}", config.notify.events.join(", "));
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("pmrotated v{} starting...", env!("CARGO_PKG_VERSION"));

    let (mut config, source) =
        match Config::load_or_default(cli.config.as_deref(), &constants::supervisor_home()) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Invalid configuration: {}", e);
                return Err(e.into());
            }
        };
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }
    log_config(&config, source.as_deref());

    let config = Arc::new(config);
    let alerts = Arc::new(NotificationManager::new(&config.notify));

    let client = Arc::new(SupervisorClient::new(config.socket_path.clone()));
    if let Err(e) = client.connect().await {
        error!(
            "Cannot reach supervisor at {}: {}",
            config.socket_path.display(),
            e
        );
        alerts
            .notify(&RotationEvent::SupervisorUnreachable {
                error: e.to_string(),
            })
            .await;
        return Err(e.into());
    }
    info!("Connected to supervisor at {}", config.socket_path.display());

    let daemon = Arc::new(Daemon::new(Arc::clone(&config), client, alerts));

    if cli.once {
        let summary = daemon.run_pass(Trigger::Manual { force: cli.force }).await;
        info!(
            "Pass complete: {} evaluated, {} rotated, {} failed",
            summary.evaluated, summary.rotated, summary.failed
        );
        return Ok(());
    }

    // Set up signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = daemon.run() => {}
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    info!("pmrotated stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(default_filter(0).starts_with("pmrotated=info,"));
        assert!(default_filter(1).contains("pmrotate_logs=debug"));
        assert!(default_filter(5).contains("pmrotate_ipc=trace"));
        assert_eq!(default_filter(0).split(',').count(), LOG_TARGETS.len());
    }
}
