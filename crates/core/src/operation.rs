// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations for the write-ahead log
//!
//! Every store mutation is validated against the materialized state first
//! and then expressed as exactly one operation. Applying the same sequence
//! of operations to an empty state reproduces the store.

use crate::group::{ProcessMode, Resource, ResourceGroup};
use crate::id::{ProcessableId, ResourceGroupId, ResourceId};
use crate::processable::Processable;
use serde::{Deserialize, Serialize};

/// Operations that can be persisted to the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a resource group together with its fixed pool
    GroupCreate {
        group: ResourceGroup,
        resources: Vec<Resource>,
    },

    /// Administrative process-mode change on an idle group
    ProcessModeChange {
        group_id: ResourceGroupId,
        mode: ProcessMode,
    },

    /// Store a new processable
    ProcessableInsert { processable: Processable },

    /// Replace a processable with a newer version
    ProcessableUpdate { processable: Processable },

    /// Write a processable and bind it to a resource in one step
    ResourceAssign {
        group_id: ResourceGroupId,
        resource_id: ResourceId,
        processable: Processable,
    },

    /// Clear the holder link of a resource
    ResourceRelease {
        group_id: ResourceGroupId,
        resource_id: ResourceId,
        processable_id: ProcessableId,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GroupCreate { .. } => "group_create",
            Operation::ProcessModeChange { .. } => "process_mode_change",
            Operation::ProcessableInsert { .. } => "processable_insert",
            Operation::ProcessableUpdate { .. } => "processable_update",
            Operation::ResourceAssign { .. } => "resource_assign",
            Operation::ResourceRelease { .. } => "resource_release",
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
