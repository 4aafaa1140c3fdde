// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processable lifecycle service
//!
//! The operations a pipeline executor calls as jobs move through their
//! states. Each one reloads the processable, applies a pure transition and
//! writes the result with a versioned compare-and-swap, retrying on lost
//! races. Effects are handed back to the caller to execute.

use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::group::{ProcessMode, DEFAULT_CAPACITY};
use crate::id::{PipelineId, ProcessableId, ProjectId};
use crate::optimistic::{retry_lock, Conflict, LockError, RetryPolicy};
use crate::processable::{
    FailureReason, NewProcessable, Processable, ProcessableEvent, TransitionError,
};
use crate::store::{ResourceStore, StoreError};
use crate::variables;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("resource group key {key:?} expands to an empty string")]
    EmptyResourceGroupKey { key: String },
}

impl Conflict for LifecycleError {
    fn is_stale(&self) -> bool {
        match self {
            LifecycleError::Store(e) => e.is_stale(),
            LifecycleError::Lock(e) => e.is_stale(),
            _ => false,
        }
    }
}

/// A job as declared by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewJob {
    pub pipeline_id: PipelineId,
    pub name: String,
    /// Raw `resource_group` value; may reference CI variables
    pub resource_group_key: Option<String>,
    pub variables: HashMap<String, String>,
}

/// Result of a lifecycle operation
pub type Transitioned = (Processable, Vec<Effect>);

pub struct ProcessableLifecycle<'a, S: ?Sized, C> {
    store: &'a S,
    clock: &'a C,
    policy: &'a RetryPolicy,
}

impl<'a, S, C> ProcessableLifecycle<'a, S, C>
where
    S: ResourceStore + ?Sized,
    C: Clock,
{
    pub fn new(store: &'a S, clock: &'a C, policy: &'a RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Store a new job, creating its resource group on first use
    pub fn create(
        &self,
        project_id: ProjectId,
        job: NewJob,
    ) -> Result<Transitioned, LifecycleError> {
        let mut effects = Vec::new();
        let mut new = NewProcessable::new(job.pipeline_id, job.name);

        if let Some(raw) = job.resource_group_key {
            let key = variables::expand(&raw, &job.variables);
            if key.is_empty() {
                return Err(LifecycleError::EmptyResourceGroupKey { key: raw });
            }

            let existing = self.store.find_group(project_id, &key);
            let group = match existing {
                Some(group) => group,
                None => {
                    let group = self.store.find_or_create_group(
                        project_id,
                        &key,
                        ProcessMode::default(),
                        DEFAULT_CAPACITY,
                    )?;
                    effects.push(Effect::Emit(Event::ResourceGroupCreated {
                        id: group.id,
                        project_id,
                        key: group.key.clone(),
                    }));
                    group
                }
            };
            new = new.with_resource_group(group.id);
        }

        let processable = self.store.insert_processable(new, self.clock.utc_now())?;
        effects.push(Effect::Emit(Event::ProcessableCreated {
            id: processable.id,
            pipeline_id: processable.pipeline_id,
            name: processable.name.clone(),
            group_id: processable.resource_group_id,
        }));
        Ok((processable, effects))
    }

    /// Jobs behind a resource group wait for it; others go straight to pending
    pub fn enqueue(&self, id: ProcessableId) -> Result<Transitioned, LifecycleError> {
        let job = self.load(id)?;
        let event = if job.with_resource_group() {
            ProcessableEvent::RequestResource
        } else {
            ProcessableEvent::Enqueue
        };
        self.apply(job, event)
    }

    pub fn run(&self, id: ProcessableId) -> Result<Transitioned, LifecycleError> {
        self.apply(self.load(id)?, ProcessableEvent::Run)
    }

    pub fn succeed(&self, id: ProcessableId) -> Result<Transitioned, LifecycleError> {
        self.apply(self.load(id)?, ProcessableEvent::Succeed)
    }

    pub fn drop(
        &self,
        id: ProcessableId,
        reason: FailureReason,
    ) -> Result<Transitioned, LifecycleError> {
        self.apply(self.load(id)?, ProcessableEvent::Drop { reason })
    }

    pub fn cancel(&self, id: ProcessableId) -> Result<Transitioned, LifecycleError> {
        self.apply(self.load(id)?, ProcessableEvent::Cancel)
    }

    pub fn skip(&self, id: ProcessableId) -> Result<Transitioned, LifecycleError> {
        self.apply(self.load(id)?, ProcessableEvent::Skip)
    }

    /// Flag a job as superseded by a newer deployment
    ///
    /// A waiting job is dropped by the next assignment pass, so one is
    /// requested straight away.
    pub fn mark_outdated_deployment(
        &self,
        id: ProcessableId,
    ) -> Result<Transitioned, LifecycleError> {
        let job = self.load(id)?;
        let stored = retry_lock(
            job,
            self.policy,
            "mark_outdated_deployment",
            |job| self.load(job.id),
            |job| {
                if job.has_outdated_deployment {
                    return Ok(job.clone());
                }
                let next = Processable {
                    has_outdated_deployment: true,
                    ..job.clone()
                };
                Ok(self.store.update_processable(&next)?)
            },
        )?;

        let effects = match stored.resource_group_id {
            Some(group_id) if stored.is_waiting_for_resource() => {
                vec![Effect::AssignResource { group_id }]
            }
            _ => Vec::new(),
        };
        Ok((stored, effects))
    }

    fn apply(
        &self,
        job: Processable,
        event: ProcessableEvent,
    ) -> Result<Transitioned, LifecycleError> {
        let (stored, effects) = retry_lock(
            job,
            self.policy,
            event.name(),
            |job| self.load(job.id),
            |job| {
                let (next, effects) = job.transition(event, self.clock)?;
                let stored = self.store.update_processable(&next)?;
                Ok((stored, effects))
            },
        )?;

        // Free the slot now rather than waiting for the effect to run
        if let (true, Some(group_id)) = (stored.is_terminal(), stored.resource_group_id) {
            if self.store.release_resource_from(group_id, stored.id)? {
                tracing::info!(
                    group = %group_id,
                    job = %stored.id,
                    status = %stored.status,
                    "resource released"
                );
            }
        }

        tracing::debug!(
            job = %stored.id,
            event = event.name(),
            status = %stored.status,
            "transitioned"
        );
        Ok((stored, effects))
    }

    fn load(&self, id: ProcessableId) -> Result<Processable, LifecycleError> {
        self.store.processable(id).ok_or_else(|| {
            StoreError::NotFound {
                kind: "processable",
                id: id.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
