// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects and events for state machine orchestration

use crate::id::{PipelineId, ProcessableId, ProjectId, ResourceGroupId, ResourceId};
use crate::processable::{FailureReason, ProcessableStatus};
use serde::{Deserialize, Serialize};

/// Effects are side effects that state machines request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Emit an event for other components to observe
    Emit(Event),
    /// Run an assignment pass for the group
    AssignResource { group_id: ResourceGroupId },
    /// Clear the holder link of whatever resource the processable holds
    ReleaseResource {
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
    },
}

/// Events emitted by state machines and services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Resource group events
    ResourceGroupCreated {
        id: ResourceGroupId,
        project_id: ProjectId,
        key: String,
    },

    // Processable events
    ProcessableCreated {
        id: ProcessableId,
        pipeline_id: PipelineId,
        name: String,
        group_id: Option<ResourceGroupId>,
    },
    ProcessableWaitingForResource {
        id: ProcessableId,
        group_id: ResourceGroupId,
    },
    ProcessableEnqueued {
        id: ProcessableId,
    },
    ProcessableStarted {
        id: ProcessableId,
    },
    ProcessableFinished {
        id: ProcessableId,
        status: ProcessableStatus,
    },
    ProcessableFailed {
        id: ProcessableId,
        reason: FailureReason,
    },

    // Resource events
    ResourceAssigned {
        group_id: ResourceGroupId,
        resource_id: ResourceId,
        processable_id: ProcessableId,
    },
    ResourceReleased {
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
    },
    StaleHoldReclaimed {
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
        status: ProcessableStatus,
    },
    AssignmentDeferred {
        group_id: ResourceGroupId,
        processable_id: ProcessableId,
        reason: String,
    },
}

impl Event {
    /// Get the event name for pattern matching
    /// Format: "category:action"
    pub fn name(&self) -> &'static str {
        match self {
            Event::ResourceGroupCreated { .. } => "group:created",

            Event::ProcessableCreated { .. } => "job:created",
            Event::ProcessableWaitingForResource { .. } => "job:waiting_for_resource",
            Event::ProcessableEnqueued { .. } => "job:enqueued",
            Event::ProcessableStarted { .. } => "job:started",
            Event::ProcessableFinished { .. } => "job:finished",
            Event::ProcessableFailed { .. } => "job:failed",

            Event::ResourceAssigned { .. } => "resource:assigned",
            Event::ResourceReleased { .. } => "resource:released",
            Event::StaleHoldReclaimed { .. } => "resource:reclaimed",
            Event::AssignmentDeferred { .. } => "resource:deferred",
        }
    }
}
