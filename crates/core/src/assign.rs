// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment service
//!
//! One pass over a resource group: reclaim stale holds, then admit waiting
//! processables in process-mode order until the free resources run out.
//! Passes are safe to run concurrently against the same store; every
//! admission is a versioned write that binds the resource in the same step.

use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::group::ResourceGroup;
use crate::id::{ProcessableId, ResourceGroupId, ResourceId};
use crate::optimistic::{retry_lock, Conflict, LockError, RetryPolicy};
use crate::processable::{FailureReason, Processable, ProcessableEvent, TransitionError};
use crate::store::{ResourceStore, StoreError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("resource group not found: {0}")]
    GroupNotFound(ResourceGroupId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl Conflict for AssignError {
    fn is_stale(&self) -> bool {
        match self {
            AssignError::Store(e) => e.is_stale(),
            AssignError::Lock(e) => e.is_stale(),
            _ => false,
        }
    }
}

/// What one pass did to a group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentReport {
    pub group_id: ResourceGroupId,
    /// Stale holders whose resource was reclaimed
    pub released: Vec<ProcessableId>,
    pub assigned: Vec<(ProcessableId, ResourceId)>,
    pub dropped: Vec<(ProcessableId, FailureReason)>,
    /// Left waiting because their admission attempt failed
    pub deferred: Vec<ProcessableId>,
    /// Processables still waiting after the pass
    pub remaining: usize,
    pub events: Vec<Event>,
}

impl AssignmentReport {
    fn new(group_id: ResourceGroupId) -> Self {
        Self {
            group_id,
            ..Self::default()
        }
    }

    /// Jobs are still queued; another pass will be needed
    pub fn has_waiting(&self) -> bool {
        self.remaining > 0
    }
}

enum Admission {
    Assigned(ResourceId, Vec<Event>),
    Dropped(FailureReason, Vec<Event>),
    /// No longer waiting (canceled or admitted by another pass)
    Skipped,
}

/// Assigns free resources of a group to its waiting processables
pub struct AssignResourceFromResourceGroup<'a, S: ?Sized, C> {
    store: &'a S,
    clock: &'a C,
    policy: &'a RetryPolicy,
}

impl<'a, S, C> AssignResourceFromResourceGroup<'a, S, C>
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

    pub fn execute(&self, group_id: ResourceGroupId) -> Result<AssignmentReport, AssignError> {
        let group = self
            .store
            .group(group_id)
            .ok_or(AssignError::GroupNotFound(group_id))?;
        let mut report = AssignmentReport::new(group_id);

        self.reclaim_stale(&group, &mut report);

        if group.is_misconfigured() {
            for job in self.store.upcoming_processables(group_id) {
                let reason = FailureReason::ResourceGroupMisconfigured;
                self.drop_waiting(&group, job, reason, &mut report);
            }
        } else {
            self.admit_upcoming(&group, &mut report);
        }

        report.remaining = self.store.upcoming_processables(group_id).len();
        tracing::debug!(
            group = %group_id,
            released = report.released.len(),
            assigned = report.assigned.len(),
            dropped = report.dropped.len(),
            deferred = report.deferred.len(),
            remaining = report.remaining,
            "assignment pass finished"
        );
        Ok(report)
    }

    /// A failed release leaves that hold for the next pass
    fn reclaim_stale(&self, group: &ResourceGroup, report: &mut AssignmentReport) {
        for holder in self.store.stale_processables(group.id) {
            match self.store.release_resource_from(group.id, holder.id) {
                Ok(true) => {
                    tracing::info!(
                        group = %group.id,
                        job = %holder.id,
                        status = %holder.status,
                        "reclaimed stale resource"
                    );
                    report.released.push(holder.id);
                    report.events.push(Event::StaleHoldReclaimed {
                        group_id: group.id,
                        processable_id: holder.id,
                        status: holder.status,
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        group = %group.id,
                        job = %holder.id,
                        error = %e,
                        "stale hold kept"
                    );
                }
            }
        }
    }

    /// Failures stay with the job that hit them; the rest of the batch proceeds
    fn admit_upcoming(&self, group: &ResourceGroup, report: &mut AssignmentReport) {
        let free = self.store.free_resource_count(group.id);
        if free == 0 {
            return;
        }

        for job in self.store.upcoming_processables(group.id) {
            if report.assigned.len() >= free {
                break;
            }
            let id = job.id;

            match self.admit(group, job) {
                Ok(Admission::Assigned(resource_id, events)) => {
                    tracing::info!(
                        group = %group.id,
                        job = %id,
                        resource = %resource_id,
                        "resource assigned"
                    );
                    report.assigned.push((id, resource_id));
                    report.events.extend(events);
                }
                Ok(Admission::Dropped(reason, events)) => {
                    tracing::info!(group = %group.id, job = %id, %reason, "dropped from queue");
                    report.dropped.push((id, reason));
                    report.events.extend(events);
                }
                Ok(Admission::Skipped) => {}
                // Lost the last resource to a concurrent pass
                Err(AssignError::Store(StoreError::NoFreeResource { .. })) => {
                    self.defer(group, id, "no free resource", report);
                    break;
                }
                Err(AssignError::Lock(e @ LockError::RetriesExhausted { .. })) => {
                    tracing::warn!(group = %group.id, job = %id, error = %e, "leaving job waiting");
                    self.defer(group, id, "lock retries exhausted", report);
                }
                Err(e) => {
                    tracing::warn!(group = %group.id, job = %id, error = %e, "admission failed");
                    self.defer(group, id, &e.to_string(), report);
                }
            }
        }
    }

    fn defer(
        &self,
        group: &ResourceGroup,
        id: ProcessableId,
        reason: &str,
        report: &mut AssignmentReport,
    ) {
        report.deferred.push(id);
        report.events.push(Event::AssignmentDeferred {
            group_id: group.id,
            processable_id: id,
            reason: reason.to_string(),
        });
    }

    /// Reload-and-retry wrapper around a single admission attempt
    fn admit(&self, group: &ResourceGroup, job: Processable) -> Result<Admission, AssignError> {
        retry_lock(
            job,
            self.policy,
            "assign_resource",
            |job| self.reload(job),
            |job| {
                if !job.is_waiting_for_resource() {
                    return Ok(Admission::Skipped);
                }
                if job.has_outdated_deployment {
                    let reason = FailureReason::OutdatedDeployment;
                    return self
                        .write_drop(job, reason)
                        .map(|events| Admission::Dropped(reason, events));
                }

                let (next, effects) = job.transition(ProcessableEvent::Enqueue, self.clock)?;
                let (stored, resource_id) = self.store.assign_resource(group.id, &next)?;
                let mut events = emitted(effects);
                events.push(Event::ResourceAssigned {
                    group_id: group.id,
                    resource_id,
                    processable_id: stored.id,
                });
                Ok(Admission::Assigned(resource_id, events))
            },
        )
    }

    fn drop_waiting(
        &self,
        group: &ResourceGroup,
        job: Processable,
        reason: FailureReason,
        report: &mut AssignmentReport,
    ) {
        let id = job.id;
        let outcome = retry_lock(
            job,
            self.policy,
            "drop_processable",
            |job| self.reload(job),
            |job| {
                if !job.is_waiting_for_resource() {
                    return Ok(None);
                }
                self.write_drop(job, reason).map(Some)
            },
        );

        match outcome {
            Ok(Some(events)) => {
                tracing::warn!(group = %group.id, job = %id, %reason, "dropped from queue");
                report.dropped.push((id, reason));
                report.events.extend(events);
            }
            Ok(None) => {}
            Err(AssignError::Lock(e @ LockError::RetriesExhausted { .. })) => {
                tracing::warn!(group = %group.id, job = %id, error = %e, "leaving job waiting");
                self.defer(group, id, "lock retries exhausted", report);
            }
            Err(e) => {
                tracing::warn!(group = %group.id, job = %id, error = %e, "drop failed");
                self.defer(group, id, &e.to_string(), report);
            }
        }
    }

    fn write_drop(
        &self,
        job: &Processable,
        reason: FailureReason,
    ) -> Result<Vec<Event>, AssignError> {
        let (next, effects) = job.transition(ProcessableEvent::Drop { reason }, self.clock)?;
        self.store.update_processable(&next)?;
        Ok(emitted(effects))
    }

    fn reload(&self, job: &Processable) -> Result<Processable, AssignError> {
        self.store.processable(job.id).ok_or_else(|| {
            StoreError::NotFound {
                kind: "processable",
                id: job.id.to_string(),
            }
            .into()
        })
    }
}

fn emitted(effects: Vec<Effect>) -> Vec<Event> {
    effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Emit(event) => Some(event),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[path = "assign_tests.rs"]
mod tests;
