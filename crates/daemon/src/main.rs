// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rgate daemon (rgated)
//!
//! Background process that owns the resource store and runs assignment
//! passes for the pipeline executors that connect to it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rgate_core::Config;
use rgate_daemon::lifecycle::{self, default_state_dir, LifecycleError};
use rgate_daemon::server;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Config file looked up in the working directory when none is given
const DEFAULT_CONFIG_FILE: &str = "rgate.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(std::env::args().nth(1).map(PathBuf::from))?;
    let log_guard = setup_logging(&config)?;

    info!(
        state_dir = %config.state_dir.display(),
        groups = config.resource_groups.len(),
        pid = std::process::id(),
        "starting rgated"
    );

    let mut daemon = match lifecycle::startup(&config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            // The appender is non-blocking; make sure the reason reaches the file
            record_startup_failure(&config, &e);
            error!(error = %e, "startup failed");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut sweep = tokio::time::interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Fires immediately; startup already reconciled
    sweep.tick().await;

    info!(socket = %config.socket_path().display(), "ready");
    // Supervisors wait for this line
    println!("READY");

    let reason = loop {
        let next_respawn = daemon.runtime.next_respawn();
        tokio::select! {
            accepted = daemon.listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(e) = server::handle_connection(&mut daemon, stream).await {
                        warn!(error = %e, "connection failed");
                    }
                }
                Err(e) => error!(error = %e, "accept failed"),
            },

            _ = sleep_until(next_respawn) => {
                if let Err(e) = daemon.check_timers().await {
                    error!(error = %e, "respawn pass failed");
                }
            }

            _ = sweep.tick() => {
                if let Err(e) = daemon.sweep().await {
                    error!(error = %e, "sweep failed");
                }
            }

            _ = sigterm.recv() => break "SIGTERM",
            _ = sigint.recv() => break "SIGINT",
        }

        if daemon.shutdown_requested {
            break "shutdown request";
        }
    };

    info!(reason, "stopping");
    daemon.shutdown().await?;
    Ok(())
}

/// Wait for `deadline`, forever when nothing is scheduled
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Explicit path, else `rgate.toml` in the working directory, else defaults
fn load_config(path: Option<PathBuf>) -> Result<Config, LifecycleError> {
    if let Some(path) = path {
        return Ok(Config::load(&path)?);
    }
    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Ok(Config::load(local)?);
    }
    Ok(Config::with_state_dir(default_state_dir()?))
}

/// Append the startup error to the log file directly
fn record_startup_failure(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path());
    if let Ok(mut file) = file {
        let _ = writeln!(file, "ERROR rgated startup failed: {error}");
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    let (Some(dir), Some(file)) = (log_path.parent(), log_path.file_name()) else {
        return Err(LifecycleError::NoStateDir);
    };
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(guard)
}
