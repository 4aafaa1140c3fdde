// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime that drives assignment passes
//!
//! At most one pass runs per group inside this process. A request that
//! arrives while a pass is running marks the group dirty and the running
//! task loops once more, so bursts of releases collapse into a few passes.

use crate::{error::RuntimeError, ExecuteError, Executor, Scheduler};
use rgate_core::{
    AssignmentReport, Clock, Effect, LifecycleError, ProcessableLifecycle, ResourceGroupId,
    ResourceStore, RetryPolicy, DEFAULT_RESPAWN_INTERVAL,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Runtime tuning
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Delay before re-running a pass for a group that still has waiting jobs
    pub respawn_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            respawn_interval: DEFAULT_RESPAWN_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&rgate_core::Config> for RuntimeConfig {
    fn from(config: &rgate_core::Config) -> Self {
        Self {
            respawn_interval: config.respawn_interval,
            retry: config.retry.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassState {
    Running,
    /// Requested again while running
    Dirty,
}

/// Runtime that coordinates the system
pub struct Runtime<S, C: Clock> {
    executor: Executor<S, C>,
    scheduler: Mutex<Scheduler>,
    passes: Mutex<HashMap<ResourceGroupId, PassState>>,
    respawn_interval: Duration,
}

impl<S, C> Runtime<S, C>
where
    S: ResourceStore + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<S>, clock: C, config: RuntimeConfig) -> Self {
        Self {
            executor: Executor::new(store, clock, config.retry),
            scheduler: Mutex::new(Scheduler::new()),
            passes: Mutex::new(HashMap::new()),
            respawn_interval: config.respawn_interval,
        }
    }

    /// Run a lifecycle operation on the blocking pool
    ///
    /// Lock retries sleep and journaling fsyncs, so neither may stall the
    /// async workers.
    pub async fn run_lifecycle<T, F>(&self, op: F) -> Result<T, RuntimeError>
    where
        T: Send + 'static,
        F: FnOnce(&ProcessableLifecycle<'_, S, C>) -> Result<T, LifecycleError> + Send + 'static,
    {
        let store = Arc::clone(self.executor.store());
        let clock = self.executor.clock().clone();
        let policy = self.executor.policy().clone();

        let out = tokio::task::spawn_blocking(move || {
            op(&ProcessableLifecycle::new(&*store, &clock, &policy))
        })
        .await
        .map_err(ExecuteError::from)??;
        Ok(out)
    }

    pub fn store(&self) -> &Arc<S> {
        self.executor.store()
    }

    /// Execute effects in order, running any passes they request
    pub async fn execute_all(
        &self,
        effects: Vec<Effect>,
    ) -> Result<Vec<AssignmentReport>, RuntimeError> {
        let mut reports = Vec::new();
        for effect in effects {
            if let Some(group_id) = self.executor.execute(effect).await? {
                reports.extend(self.assign(group_id).await?);
            }
        }
        Ok(reports)
    }

    /// Run assignment passes for `group_id` until no request is pending
    ///
    /// Returns an empty list when another task already owns the group's
    /// pass; that task picks up the request.
    pub async fn assign(
        &self,
        group_id: ResourceGroupId,
    ) -> Result<Vec<AssignmentReport>, RuntimeError> {
        {
            let mut passes = self.passes();
            if passes.contains_key(&group_id) {
                passes.insert(group_id, PassState::Dirty);
                tracing::debug!(group = %group_id, "pass already running, coalesced");
                return Ok(Vec::new());
            }
            passes.insert(group_id, PassState::Running);
        }

        let mut reports = Vec::new();
        loop {
            let report = match self.executor.run_pass(group_id).await {
                Ok(report) => report,
                Err(e) => {
                    self.passes().remove(&group_id);
                    return Err(e.into());
                }
            };
            self.schedule_respawn(&report);
            reports.push(report);

            let mut passes = self.passes();
            if passes.get(&group_id) == Some(&PassState::Dirty) {
                passes.insert(group_id, PassState::Running);
                continue;
            }
            passes.remove(&group_id);
            break;
        }
        Ok(reports)
    }

    fn schedule_respawn(&self, report: &AssignmentReport) {
        let mut scheduler = self.scheduler();
        if report.has_waiting() {
            let now = self.executor.clock().now();
            scheduler.set_timer(report.group_id, self.respawn_interval, now);
            tracing::debug!(
                group = %report.group_id,
                remaining = report.remaining,
                after = ?self.respawn_interval,
                "respawn scheduled"
            );
        } else {
            scheduler.cancel_timer(report.group_id);
        }
    }

    /// Run passes for every group whose respawn timer is due
    pub async fn fire_timers(&self) -> Result<Vec<AssignmentReport>, RuntimeError> {
        let now = self.executor.clock().now();
        let fired = self.scheduler().fired_timers(now);

        let mut reports = Vec::new();
        for group_id in fired {
            tracing::debug!(group = %group_id, "respawn timer fired");
            reports.extend(self.assign(group_id).await?);
        }
        Ok(reports)
    }

    /// Run a pass for every group with waiting jobs or stale holds
    ///
    /// Catches requests lost to a crash between a release and its pass.
    pub async fn sweep(&self) -> Result<Vec<AssignmentReport>, RuntimeError> {
        let store = self.executor.store();
        let due: Vec<_> = store
            .groups()
            .into_iter()
            .map(|group| group.id)
            .filter(|id| {
                !store.upcoming_processables(*id).is_empty()
                    || !store.stale_processables(*id).is_empty()
            })
            .collect();

        tracing::debug!(groups = due.len(), "sweep");
        let mut reports = Vec::new();
        for group_id in due {
            reports.extend(self.assign(group_id).await?);
        }
        Ok(reports)
    }

    /// Earliest pending respawn, on this runtime's clock
    pub fn next_respawn(&self) -> Option<Instant> {
        self.scheduler().next_deadline()
    }

    pub fn has_respawn(&self, group_id: ResourceGroupId) -> bool {
        self.scheduler().has_timer(group_id)
    }

    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn passes(&self) -> MutexGuard<'_, HashMap<ResourceGroupId, PassState>> {
        self.passes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
