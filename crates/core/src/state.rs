// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized resource-group state
//!
//! Writes happen in two steps: a `plan_*` method validates the request
//! against the current state and returns the [`Operation`] describing it,
//! then [`MaterializedState::apply`] performs it. `apply` never fails, so
//! replaying a log of planned operations rebuilds the same state.

use crate::group::{ProcessMode, Resource, ResourceGroup};
use crate::id::{PipelineId, ProcessableId, ProjectId, ResourceGroupId, ResourceId};
use crate::operation::Operation;
use crate::processable::{NewProcessable, Processable, ProcessableStatus};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Materialized state built from store operations
#[derive(Debug, Clone, Default)]
pub struct MaterializedState {
    pub groups: BTreeMap<ResourceGroupId, ResourceGroup>,
    pub resources: BTreeMap<ResourceId, Resource>,
    pub processables: BTreeMap<ProcessableId, Processable>,
    last_group_id: u64,
    last_resource_id: u64,
    last_processable_id: u64,
}

impl MaterializedState {
    /// Rebuild state by applying operations in order
    pub fn replay<'a>(ops: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut state = Self::default();
        for op in ops {
            state.apply(op);
        }
        state
    }

    pub fn group(&self, id: ResourceGroupId) -> Option<&ResourceGroup> {
        self.groups.get(&id)
    }

    pub fn find_group(&self, project_id: ProjectId, key: &str) -> Option<&ResourceGroup> {
        self.groups
            .values()
            .find(|g| g.project_id == project_id && g.key == key)
    }

    pub fn resources_of(&self, group_id: ResourceGroupId) -> impl Iterator<Item = &Resource> {
        self.resources
            .values()
            .filter(move |r| r.group_id == group_id)
    }

    pub fn free_resource_count(&self, group_id: ResourceGroupId) -> usize {
        self.resources_of(group_id).filter(|r| r.is_free()).count()
    }

    /// The resource of `group_id` held by `processable_id`, if any
    pub fn held_resource(
        &self,
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
    ) -> Option<&Resource> {
        self.resources_of(group_id)
            .find(|r| r.is_held_by(processable_id))
    }

    pub fn processable(&self, id: ProcessableId) -> Option<&Processable> {
        self.processables.get(&id)
    }

    /// Processables that declare membership in the group
    pub fn processables_of(&self, group_id: ResourceGroupId) -> Vec<Processable> {
        self.processables
            .values()
            .filter(|p| p.resource_group_id == Some(group_id))
            .cloned()
            .collect()
    }

    pub fn processables_in_pipeline(&self, pipeline_id: PipelineId) -> Vec<Processable> {
        self.processables
            .values()
            .filter(|p| p.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    /// Holders of the group's resources that should not be holding them
    ///
    /// A hold is stale when the holder is not active (finished, or never
    /// dispatched) or no longer belongs to the group.
    pub fn stale_processables(&self, group_id: ResourceGroupId) -> Vec<Processable> {
        self.resources_of(group_id)
            .filter_map(|r| r.processable_id)
            .filter_map(|id| self.processables.get(&id))
            .filter(|p| !p.status.is_active() || p.resource_group_id != Some(group_id))
            .cloned()
            .collect()
    }

    /// Waiting processables of the group, in admission order
    pub fn upcoming_processables(&self, group_id: ResourceGroupId) -> Vec<Processable> {
        let Some(group) = self.groups.get(&group_id) else {
            return Vec::new();
        };

        let mut upcoming: Vec<Processable> = self
            .processables
            .values()
            .filter(|p| {
                p.resource_group_id == Some(group_id)
                    && p.status == ProcessableStatus::WaitingForResource
            })
            .cloned()
            .collect();

        upcoming.sort_by_key(|p| (p.enqueued_at.unwrap_or(p.created_at), p.id));
        if group.process_mode == ProcessMode::NewestFirst {
            upcoming.reverse();
        }
        upcoming
    }

    /// A group is locked against mode changes while anything waits on it or holds it
    fn is_busy(&self, group_id: ResourceGroupId) -> bool {
        self.free_resource_count(group_id) != self.resources_of(group_id).count()
            || self.processables.values().any(|p| {
                p.resource_group_id == Some(group_id)
                    && p.status == ProcessableStatus::WaitingForResource
            })
    }

    pub fn plan_group_create(
        &self,
        project_id: ProjectId,
        key: &str,
        process_mode: ProcessMode,
        capacity: u32,
    ) -> Operation {
        let group_id = ResourceGroupId(self.last_group_id + 1);
        let resources = (1..=u64::from(capacity))
            .map(|n| Resource {
                id: ResourceId(self.last_resource_id + n),
                group_id,
                processable_id: None,
            })
            .collect();

        Operation::GroupCreate {
            group: ResourceGroup {
                id: group_id,
                project_id,
                key: key.to_string(),
                process_mode,
                capacity,
            },
            resources,
        }
    }

    pub fn plan_process_mode_change(
        &self,
        group_id: ResourceGroupId,
        mode: ProcessMode,
    ) -> Result<Option<Operation>, StoreError> {
        let group = self.require_group(group_id)?;
        if group.process_mode == mode {
            return Ok(None);
        }
        if self.is_busy(group_id) {
            return Err(StoreError::ProcessModeLocked { group: group_id });
        }
        Ok(Some(Operation::ProcessModeChange { group_id, mode }))
    }

    pub fn plan_insert(
        &self,
        new: NewProcessable,
        created_at: DateTime<Utc>,
    ) -> Result<Operation, StoreError> {
        if let Some(group_id) = new.resource_group_id {
            self.require_group(group_id)?;
        }
        let id = ProcessableId(self.last_processable_id + 1);
        Ok(Operation::ProcessableInsert {
            processable: Processable::create(id, new, created_at),
        })
    }

    /// Compare-and-swap on the lock version
    pub fn plan_update(&self, processable: &Processable) -> Result<Operation, StoreError> {
        let next = self.check_version(processable)?;
        Ok(Operation::ProcessableUpdate { processable: next })
    }

    /// Versioned write plus a bind to the lowest-id free resource
    pub fn plan_assign(
        &self,
        group_id: ResourceGroupId,
        processable: &Processable,
    ) -> Result<Operation, StoreError> {
        self.require_group(group_id)?;
        let next = self.check_version(processable)?;

        if self.held_resource(group_id, processable.id).is_some() {
            return Err(StoreError::Corrupt(format!(
                "{} already holds a resource of {}",
                processable.id, group_id
            )));
        }

        let resource = self
            .resources_of(group_id)
            .find(|r| r.is_free())
            .ok_or(StoreError::NoFreeResource { group: group_id })?;

        Ok(Operation::ResourceAssign {
            group_id,
            resource_id: resource.id,
            processable: next,
        })
    }

    /// `None` when the processable holds nothing in the group
    pub fn plan_release(
        &self,
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
    ) -> Option<Operation> {
        self.held_resource(group_id, processable_id)
            .map(|resource| Operation::ResourceRelease {
                group_id,
                resource_id: resource.id,
                processable_id,
            })
    }

    fn require_group(&self, group_id: ResourceGroupId) -> Result<&ResourceGroup, StoreError> {
        self.groups.get(&group_id).ok_or(StoreError::NotFound {
            kind: "resource_group",
            id: group_id.to_string(),
        })
    }

    /// Return the processable as it will be stored: version bumped
    fn check_version(&self, processable: &Processable) -> Result<Processable, StoreError> {
        let stored = self
            .processables
            .get(&processable.id)
            .ok_or(StoreError::NotFound {
                kind: "processable",
                id: processable.id.to_string(),
            })?;

        if stored.lock_version != processable.lock_version {
            return Err(StoreError::StaleObject {
                kind: "processable",
                id: processable.id.to_string(),
                expected: processable.lock_version,
                actual: stored.lock_version,
            });
        }

        Ok(Processable {
            lock_version: stored.lock_version + 1,
            ..processable.clone()
        })
    }

    /// Apply an operation to update the state
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::GroupCreate { group, resources } => {
                self.last_group_id = self.last_group_id.max(group.id.0);
                self.groups.insert(group.id, group.clone());
                for resource in resources {
                    self.last_resource_id = self.last_resource_id.max(resource.id.0);
                    self.resources.insert(resource.id, resource.clone());
                }
            }

            Operation::ProcessModeChange { group_id, mode } => {
                if let Some(group) = self.groups.get_mut(group_id) {
                    group.process_mode = *mode;
                }
            }

            Operation::ProcessableInsert { processable }
            | Operation::ProcessableUpdate { processable } => {
                self.last_processable_id = self.last_processable_id.max(processable.id.0);
                self.processables.insert(processable.id, processable.clone());
            }

            Operation::ResourceAssign {
                resource_id,
                processable,
                ..
            } => {
                if let Some(resource) = self.resources.get_mut(resource_id) {
                    resource.processable_id = Some(processable.id);
                }
                self.processables.insert(processable.id, processable.clone());
            }

            Operation::ResourceRelease {
                resource_id,
                processable_id,
                ..
            } => {
                if let Some(resource) = self.resources.get_mut(resource_id) {
                    if resource.is_held_by(*processable_id) {
                        resource.processable_id = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
