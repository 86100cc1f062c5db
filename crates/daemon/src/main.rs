// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Convoy daemon (convoyd)
//!
//! Background process that owns the scheduler tick and the orchestrator
//! consumer loops. Runbook CRUD and the admin surface live elsewhere
//! and reach this process through the shared store and bus.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use convoy_daemon::{Service, ServiceConfig};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("convoyd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("convoyd {}", env!("CARGO_PKG_VERSION"));
                println!("Convoy daemon - drives runbook batches against migrating members");
                println!();
                println!("USAGE:");
                println!("    convoyd");
                println!();
                println!("Configuration via env: CONVOY_STATE_DIR, CONVOY_TICK_SECS,");
                println!("CONVOY_LEASE_TTL_SECS, CONVOY_PREFETCH, RUST_LOG.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: convoyd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = ServiceConfig::default();
    let _log_guard = setup_logging(&config)?;

    info!(
        state_dir = %config.state_dir.display(),
        tick_secs = config.tick_interval.as_secs(),
        "starting convoyd"
    );

    let service = Service::new(config.clone());
    let loaded =
        convoy_daemon::load_runbooks(&service.store, &config.state_dir.join("runbooks"));
    info!(loaded, "runbooks registered from disk");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        result = service.run() => {
            if let Err(e) = result {
                error!("daemon loop failed: {}", e);
                return Err(e.into());
            }
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
            service.shutdown();
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
            service.shutdown();
        }
    }

    info!("convoyd stopped");
    Ok(())
}

fn setup_logging(
    config: &ServiceConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = config.state_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "convoyd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
