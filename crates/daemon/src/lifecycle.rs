// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown
//!
//! Startup order: state dir, PID lock, WAL replay, configured groups,
//! socket, reconciliation sweep.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use rgate_core::{Config, Effect, ResourceStore, StoreError, SystemClock};
use rgate_engine::{Runtime, RuntimeConfig, RuntimeError};
use rgate_storage::WalStore;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Daemon runtime over the durable store and the system clock
pub type DaemonRuntime = Runtime<WalStore, SystemClock>;

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // Dropping the file releases the PID lock
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub runtime: DaemonRuntime,
    pub start_time: Instant,
    pub shutdown_requested: bool,
}

impl DaemonState {
    /// Execute effects returned by a lifecycle call
    pub async fn process_effects(&self, effects: Vec<Effect>) -> Result<(), LifecycleError> {
        let reports = self.runtime.execute_all(effects).await?;
        for report in reports {
            if !report.assigned.is_empty() || !report.dropped.is_empty() {
                info!(
                    group = %report.group_id,
                    assigned = report.assigned.len(),
                    dropped = report.dropped.len(),
                    remaining = report.remaining,
                    "assignment pass"
                );
            }
        }
        Ok(())
    }

    /// Fire due respawn timers
    pub async fn check_timers(&self) -> Result<(), LifecycleError> {
        self.runtime.fire_timers().await?;
        Ok(())
    }

    /// Reconcile every group with waiting jobs or stale holds
    pub async fn sweep(&self) -> Result<(), LifecycleError> {
        let reports = self.runtime.sweep().await?;
        let released: usize = reports.iter().map(|r| r.released.len()).sum();
        if released > 0 {
            warn!(released, "sweep reclaimed stale resource holds");
        }
        Ok(())
    }

    /// Remove the socket and PID file; the lock goes with `self`
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        remove_runtime_files(&self.config);
        info!(uptime_secs = self.start_time.elapsed().as_secs(), "daemon stopped");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no state directory could be determined")]
    NoStateDir,

    #[error("PID file is locked; is another rgated running? ({0})")]
    LockFailed(#[source] std::io::Error),

    #[error("cannot bind {}: {}", .0.display(), .1)]
    BindFailed(std::path::PathBuf, std::io::Error),

    #[error(transparent)]
    Config(#[from] rgate_core::ConfigError),

    #[error("write-ahead log: {0}")]
    Wal(#[from] rgate_storage::WalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Start the daemon, removing anything it created if startup fails
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    let result = startup_inner(config).await;
    if let Err(e) = &result {
        // Another daemon owns the socket and PID file
        if !matches!(e, LifecycleError::LockFailed(_)) {
            remove_runtime_files(config);
        }
    }
    result
}

/// Exclusive lock on the PID file, held for the daemon's lifetime
fn lock_pid_file(path: &Path) -> Result<File, LifecycleError> {
    use std::io::Write;

    let mut file = File::options()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    // Lock before touching the log so two daemons never append to it
    let lock_file = lock_pid_file(&config.pid_path())?;

    let store = rgate_storage::open(&config.wal_path())?;

    // Configured groups that already exist keep their stored pool
    for group in &config.resource_groups {
        let created = store.find_or_create_group(
            group.project,
            &group.key,
            group.process_mode,
            group.capacity,
        )?;
        if created.capacity != group.capacity {
            warn!(
                group = %created.id,
                key = %created.key,
                stored = created.capacity,
                configured = group.capacity,
                "capacity differs from config; keeping stored pool"
            );
        }
    }

    // Bind last, once everything else has succeeded
    let socket_path = config.socket_path();
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)
        .map_err(|e| LifecycleError::BindFailed(socket_path.clone(), e))?;

    let runtime = Runtime::new(Arc::new(store), SystemClock, RuntimeConfig::from(config));

    // Catch up on passes a crash may have skipped
    let reports = runtime.sweep().await?;
    let waiting: usize = reports.iter().map(|r| r.remaining).sum();
    info!(
        groups = runtime.store().groups().len(),
        reconciled = reports.len(),
        waiting,
        "daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        runtime,
        start_time: Instant::now(),
        shutdown_requested: false,
    })
}

fn remove_runtime_files(config: &Config) {
    for path in [config.socket_path(), config.pid_path()] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove runtime file"),
        }
    }
}

/// Default state directory: `$XDG_STATE_HOME/rgate`, else `~/.local/state/rgate`
pub fn default_state_dir() -> Result<std::path::PathBuf, LifecycleError> {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .map(|dir| dir.join("rgate"))
        .ok_or(LifecycleError::NoStateDir)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
