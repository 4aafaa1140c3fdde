// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource groups and their resource pools
//!
//! A resource group is a named mutual-exclusion domain within a project.
//! It owns a fixed pool of fungible resources; each resource is either free
//! or held by exactly one processable.

use crate::id::{ProcessableId, ProjectId, ResourceGroupId, ResourceId};
use serde::{Deserialize, Serialize};

/// Capacity given to a group created without explicit configuration
pub const DEFAULT_CAPACITY: u32 = 1;

/// Order in which waiting processables are admitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// No guaranteed order (insertion order in practice)
    #[default]
    Unordered,
    /// First in, first out
    OldestFirst,
    /// Latest enqueued wins
    NewestFirst,
}

impl ProcessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessMode::Unordered => "unordered",
            ProcessMode::OldestFirst => "oldest_first",
            ProcessMode::NewestFirst => "newest_first",
        }
    }
}

impl std::fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unordered" => Ok(ProcessMode::Unordered),
            "oldest_first" => Ok(ProcessMode::OldestFirst),
            "newest_first" => Ok(ProcessMode::NewestFirst),
            other => Err(format!("unknown process mode: {}", other)),
        }
    }
}

/// A named mutual-exclusion domain scoped to a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: ResourceGroupId,
    pub project_id: ProjectId,
    /// Unique per project
    pub key: String,
    pub process_mode: ProcessMode,
    /// Number of resources created with the group
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

impl ResourceGroup {
    /// A group that can never admit anything
    pub fn is_misconfigured(&self) -> bool {
        self.capacity == 0
    }
}

/// One slot in a resource group's pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub group_id: ResourceGroupId,
    /// Current holder; `None` means free
    pub processable_id: Option<ProcessableId>,
}

impl Resource {
    pub fn is_free(&self) -> bool {
        self.processable_id.is_none()
    }

    pub fn is_held_by(&self, id: ProcessableId) -> bool {
        self.processable_id == Some(id)
    }
}
