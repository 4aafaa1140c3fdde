// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-group store
//!
//! [`ResourceStore`] is the persistence boundary for groups, their resource
//! pools and processables. Every write is a compare-and-swap on the
//! processable's lock version; binding a resource and updating its holder
//! happen in one step so no two processables can hold the same resource.

use crate::group::{ProcessMode, Resource, ResourceGroup};
use crate::id::{PipelineId, ProcessableId, ProjectId, ResourceGroupId, ResourceId};
use crate::operation::Operation;
use crate::processable::{NewProcessable, Processable};
use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("stale {kind} {id}: expected version {expected}, found {actual}")]
    StaleObject {
        kind: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("no free resource in {group}")]
    NoFreeResource { group: ResourceGroupId },
    #[error("process mode of {group} cannot change while jobs are queued or running")]
    ProcessModeLocked { group: ResourceGroupId },
    #[error("journal write failed: {0}")]
    Journal(String),
    #[error("corrupt state: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Lost an optimistic-lock race; reload and retry
    pub fn is_stale(&self) -> bool {
        matches!(self, StoreError::StaleObject { .. })
    }
}

/// Persistence boundary for resource groups and processables
pub trait ResourceStore: Send + Sync {
    /// Find the group for `(project_id, key)`, creating it with `capacity`
    /// resources if it does not exist yet
    fn find_or_create_group(
        &self,
        project_id: ProjectId,
        key: &str,
        process_mode: ProcessMode,
        capacity: u32,
    ) -> Result<ResourceGroup, StoreError>;

    fn change_process_mode(
        &self,
        group_id: ResourceGroupId,
        mode: ProcessMode,
    ) -> Result<ResourceGroup, StoreError>;

    fn find_group(&self, project_id: ProjectId, key: &str) -> Option<ResourceGroup>;

    fn group(&self, id: ResourceGroupId) -> Option<ResourceGroup>;

    fn groups(&self) -> Vec<ResourceGroup>;

    fn resources(&self, group_id: ResourceGroupId) -> Vec<Resource>;

    fn free_resource_count(&self, group_id: ResourceGroupId) -> usize;

    fn stale_processables(&self, group_id: ResourceGroupId) -> Vec<Processable>;

    /// Clear the holder link; `false` when nothing was held
    fn release_resource_from(
        &self,
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
    ) -> Result<bool, StoreError>;

    fn upcoming_processables(&self, group_id: ResourceGroupId) -> Vec<Processable>;

    fn processable(&self, id: ProcessableId) -> Option<Processable>;

    fn processables(&self, group_id: ResourceGroupId) -> Vec<Processable>;

    fn pipeline_processables(&self, pipeline_id: PipelineId) -> Vec<Processable>;

    fn insert_processable(
        &self,
        new: NewProcessable,
        created_at: DateTime<Utc>,
    ) -> Result<Processable, StoreError>;

    /// Compare-and-swap write; returns the stored version
    fn update_processable(&self, processable: &Processable) -> Result<Processable, StoreError>;

    /// Write `processable` and bind it to a free resource atomically
    fn assign_resource(
        &self,
        group_id: ResourceGroupId,
        processable: &Processable,
    ) -> Result<(Processable, ResourceId), StoreError>;
}

/// Destination for operations before they are applied
pub trait OperationLog: Send {
    fn append(&mut self, op: &Operation) -> Result<(), StoreError>;
}

/// Log that keeps nothing
#[derive(Debug, Default)]
pub struct Volatile;

impl OperationLog for Volatile {
    fn append(&mut self, _op: &Operation) -> Result<(), StoreError> {
        Ok(())
    }
}

struct Journal<L> {
    state: MaterializedState,
    log: L,
}

/// Store over a materialized state, journaling each operation before it is applied
pub struct JournaledStore<L> {
    inner: Mutex<Journal<L>>,
}

/// In-memory store
pub type MemoryStore = JournaledStore<Volatile>;

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_log(MaterializedState::default(), Volatile)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: OperationLog> JournaledStore<L> {
    /// Resume from `state` (typically a replay of `log`)
    pub fn with_log(state: MaterializedState, log: L) -> Self {
        Self {
            inner: Mutex::new(Journal { state, log }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Journal<L>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> T {
        f(&self.lock().state)
    }

    /// Plan against the current state, journal the operation, then apply it
    fn write<T>(
        &self,
        plan: impl FnOnce(&MaterializedState) -> Result<(Option<Operation>, T), StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock();
        let journal = &mut *guard;
        let (op, out) = plan(&journal.state)?;
        if let Some(op) = op {
            journal.log.append(&op)?;
            journal.state.apply(&op);
            tracing::trace!(op = op.name(), "applied");
        }
        Ok(out)
    }
}

impl<L: OperationLog> ResourceStore for JournaledStore<L> {
    fn find_or_create_group(
        &self,
        project_id: ProjectId,
        key: &str,
        process_mode: ProcessMode,
        capacity: u32,
    ) -> Result<ResourceGroup, StoreError> {
        self.write(|state| {
            if let Some(group) = state.find_group(project_id, key) {
                return Ok((None, group.clone()));
            }
            let op = state.plan_group_create(project_id, key, process_mode, capacity);
            let Operation::GroupCreate { group, .. } = &op else {
                return Err(StoreError::Corrupt(format!(
                    "unexpected {} while creating a group",
                    op.name()
                )));
            };
            let group = group.clone();
            Ok((Some(op), group))
        })
    }

    fn change_process_mode(
        &self,
        group_id: ResourceGroupId,
        mode: ProcessMode,
    ) -> Result<ResourceGroup, StoreError> {
        self.write(|state| {
            let op = state.plan_process_mode_change(group_id, mode)?;
            let group = state.group(group_id).cloned().map(|g| ResourceGroup {
                process_mode: mode,
                ..g
            });
            let group = group.ok_or(StoreError::NotFound {
                kind: "resource_group",
                id: group_id.to_string(),
            })?;
            Ok((op, group))
        })
    }

    fn find_group(&self, project_id: ProjectId, key: &str) -> Option<ResourceGroup> {
        self.read(|state| state.find_group(project_id, key).cloned())
    }

    fn group(&self, id: ResourceGroupId) -> Option<ResourceGroup> {
        self.read(|state| state.group(id).cloned())
    }

    fn groups(&self) -> Vec<ResourceGroup> {
        self.read(|state| state.groups.values().cloned().collect())
    }

    fn resources(&self, group_id: ResourceGroupId) -> Vec<Resource> {
        self.read(|state| state.resources_of(group_id).cloned().collect())
    }

    fn free_resource_count(&self, group_id: ResourceGroupId) -> usize {
        self.read(|state| state.free_resource_count(group_id))
    }

    fn stale_processables(&self, group_id: ResourceGroupId) -> Vec<Processable> {
        self.read(|state| state.stale_processables(group_id))
    }

    fn release_resource_from(
        &self,
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
    ) -> Result<bool, StoreError> {
        self.write(|state| {
            let op = state.plan_release(group_id, processable_id);
            let released = op.is_some();
            Ok((op, released))
        })
    }

    fn upcoming_processables(&self, group_id: ResourceGroupId) -> Vec<Processable> {
        self.read(|state| state.upcoming_processables(group_id))
    }

    fn processable(&self, id: ProcessableId) -> Option<Processable> {
        self.read(|state| state.processable(id).cloned())
    }

    fn processables(&self, group_id: ResourceGroupId) -> Vec<Processable> {
        self.read(|state| state.processables_of(group_id))
    }

    fn pipeline_processables(&self, pipeline_id: PipelineId) -> Vec<Processable> {
        self.read(|state| state.processables_in_pipeline(pipeline_id))
    }

    fn insert_processable(
        &self,
        new: NewProcessable,
        created_at: DateTime<Utc>,
    ) -> Result<Processable, StoreError> {
        self.write(|state| {
            let op = state.plan_insert(new, created_at)?;
            let Operation::ProcessableInsert { processable } = &op else {
                return Err(StoreError::Corrupt(format!(
                    "unexpected {} while inserting",
                    op.name()
                )));
            };
            let processable = processable.clone();
            Ok((Some(op), processable))
        })
    }

    fn update_processable(&self, processable: &Processable) -> Result<Processable, StoreError> {
        self.write(|state| {
            let op = state.plan_update(processable)?;
            let Operation::ProcessableUpdate { processable } = &op else {
                return Err(StoreError::Corrupt(format!(
                    "unexpected {} while updating",
                    op.name()
                )));
            };
            let processable = processable.clone();
            Ok((Some(op), processable))
        })
    }

    fn assign_resource(
        &self,
        group_id: ResourceGroupId,
        processable: &Processable,
    ) -> Result<(Processable, ResourceId), StoreError> {
        self.write(|state| {
            let op = state.plan_assign(group_id, processable)?;
            let Operation::ResourceAssign {
                resource_id,
                processable,
                ..
            } = &op
            else {
                return Err(StoreError::Corrupt(format!(
                    "unexpected {} while assigning",
                    op.name()
                )));
            };
            let out = (processable.clone(), *resource_id);
            Ok((Some(op), out))
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
