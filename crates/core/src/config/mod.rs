// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler configuration
//!
//! Loaded from TOML. Durations use humantime syntax (`"1m"`, `"250ms"`).

use crate::group::{ProcessMode, DEFAULT_CAPACITY};
use crate::id::ProjectId;
use crate::optimistic::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Delay before re-running a pass for a group that still has waiting jobs
pub const DEFAULT_RESPAWN_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// A resource group created at startup with explicit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub project: ProjectId,
    pub key: String,
    #[serde(default)]
    pub process_mode: ProcessMode,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Defaults to `rgate.sock` inside `state_dir`
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(with = "humantime_serde", default = "default_respawn_interval")]
    pub respawn_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub resource_groups: Vec<GroupConfig>,
}

fn default_respawn_interval() -> Duration {
    DEFAULT_RESPAWN_INTERVAL
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

impl Config {
    /// Defaults rooted at `state_dir`
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            socket_path: None,
            respawn_interval: DEFAULT_RESPAWN_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retry: RetryPolicy::default(),
            resource_groups: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retries == 0 {
            return Err(invalid("retry.max_retries", "must be at least 1"));
        }
        if self.retry.max_backoff < self.retry.initial_backoff {
            return Err(invalid("retry.max_backoff", "must not be below initial_backoff"));
        }
        if self.respawn_interval.is_zero() {
            return Err(invalid("respawn_interval", "must be positive"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweep_interval", "must be positive"));
        }

        let mut seen = HashSet::new();
        for (i, group) in self.resource_groups.iter().enumerate() {
            if group.key.trim().is_empty() {
                return Err(invalid(format!("resource_groups[{i}].key"), "must not be empty"));
            }
            if group.capacity == 0 {
                return Err(invalid(
                    format!("resource_groups[{i}].capacity"),
                    "must be at least 1",
                ));
            }
            if !seen.insert((group.project, group.key.as_str())) {
                return Err(invalid(
                    format!("resource_groups[{i}]"),
                    format!("duplicate key {:?} in {}", group.key, group.project),
                ));
            }
        }
        Ok(())
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join("rgate.sock"))
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("wal").join("operations.wal")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir.join("rgated.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("rgated.log")
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
