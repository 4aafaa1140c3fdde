// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optimistic-lock retry helper
//!
//! Writes are compare-and-swap on a lock version. A writer that loses the
//! race reloads the subject and tries again with exponential backoff,
//! giving up after a bounded number of retries.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("{name}: gave up after {attempts} attempts")]
    RetriesExhausted { name: String, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that can signal a lost optimistic-lock race
pub trait Conflict {
    fn is_stale(&self) -> bool;
}

impl Conflict for StoreError {
    fn is_stale(&self) -> bool {
        StoreError::is_stale(self)
    }
}

impl Conflict for LockError {
    fn is_stale(&self) -> bool {
        match self {
            LockError::Store(e) => e.is_stale(),
            LockError::RetriesExhausted { .. } => false,
        }
    }
}

/// Backoff and retry bounds for optimistic-lock loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, for tests and single-threaded stores
    pub fn without_backoff(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

/// Run `mutate` against `subject`, reloading and retrying on stale writes
///
/// Errors other than a lost race are returned unchanged. When the retries
/// run out the result is [`LockError::RetriesExhausted`] converted into `E`.
pub fn retry_lock<T, R, E>(
    subject: T,
    policy: &RetryPolicy,
    name: &str,
    mut reload: impl FnMut(&T) -> Result<T, E>,
    mut mutate: impl FnMut(&T) -> Result<R, E>,
) -> Result<R, E>
where
    E: Conflict + From<LockError>,
{
    let mut subject = subject;
    let mut retries = 0;

    loop {
        match mutate(&subject) {
            Err(e) if e.is_stale() => {
                if policy.is_exhausted(retries) {
                    tracing::warn!(
                        lock = name,
                        attempts = retries + 1,
                        "optimistic lock retries exhausted"
                    );
                    return Err(LockError::RetriesExhausted {
                        name: name.to_string(),
                        attempts: retries + 1,
                    }
                    .into());
                }

                let delay = policy.backoff_delay(retries);
                tracing::debug!(lock = name, retry = retries + 1, ?delay, "stale write, retrying");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                retries += 1;
                subject = reload(&subject)?;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
#[path = "optimistic_tests.rs"]
mod tests;
