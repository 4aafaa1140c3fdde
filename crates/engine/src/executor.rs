// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor

use rgate_core::{
    AssignError, AssignResourceFromResourceGroup, AssignmentReport, Clock, Effect, Event,
    ResourceGroupId, ResourceStore, RetryPolicy, StoreError, TracedEffect,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Errors that can occur during effect execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("assignment error: {0}")]
    Assign(#[from] AssignError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Executes effects against the store
///
/// Store writes are journaled synchronously, so they run on the blocking pool.
pub struct Executor<S, C> {
    store: Arc<S>,
    clock: C,
    policy: RetryPolicy,
}

impl<S, C> Executor<S, C>
where
    S: ResourceStore + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<S>, clock: C, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Execute a single effect with tracing
    ///
    /// Returns the group an `AssignResource` effect asks a pass for; the
    /// runtime decides when that pass runs.
    pub async fn execute(&self, effect: Effect) -> Result<Option<ResourceGroupId>, ExecuteError> {
        let op_name = TracedEffect::name(&effect);
        let span = tracing::info_span!("effect", effect = op_name);

        async move {
            tracing::debug!(fields = ?effect.fields(), "executing");

            let start = std::time::Instant::now();
            let result = self.execute_inner(effect).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(group) => tracing::debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    requests_pass = group.is_some(),
                    "completed"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn execute_inner(&self, effect: Effect) -> Result<Option<ResourceGroupId>, ExecuteError> {
        match effect {
            Effect::Emit(event) => {
                log_event(&event);
                Ok(None)
            }

            Effect::AssignResource { group_id } => Ok(Some(group_id)),

            Effect::ReleaseResource {
                group_id,
                processable_id,
            } => {
                let store = Arc::clone(&self.store);
                let released = tokio::task::spawn_blocking(move || {
                    store.release_resource_from(group_id, processable_id)
                })
                .await??;
                if released {
                    log_event(&Event::ResourceReleased {
                        group_id,
                        processable_id,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Run one assignment pass for `group_id` on the blocking pool
    pub async fn run_pass(
        &self,
        group_id: ResourceGroupId,
    ) -> Result<AssignmentReport, ExecuteError> {
        let store = Arc::clone(&self.store);
        let clock = self.clock.clone();
        let policy = self.policy.clone();

        let report = tokio::task::spawn_blocking(move || {
            AssignResourceFromResourceGroup::new(&*store, &clock, &policy).execute(group_id)
        })
        .await??;

        for event in &report.events {
            log_event(event);
        }
        Ok(report)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Events are the audit trail operators read; always at info
fn log_event(event: &Event) {
    tracing::info!(event = event.name(), fields = ?TracedEffect::fields(event), "event");
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
