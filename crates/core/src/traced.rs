// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing infrastructure for effects

use crate::effect::{Effect, Event};

/// Trait for operations that should be traced
///
/// Provides consistent naming and structured fields for logging.
pub trait TracedEffect {
    /// Effect name for log spans (e.g., "assign_resource", "emit")
    fn name(&self) -> &'static str;

    /// Key-value pairs for structured logging
    fn fields(&self) -> Vec<(&'static str, String)>;
}

impl TracedEffect for Effect {
    fn name(&self) -> &'static str {
        match self {
            Effect::Emit(_) => "emit",
            Effect::AssignResource { .. } => "assign_resource",
            Effect::ReleaseResource { .. } => "release_resource",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit(event) => vec![("event", event.name().to_string())],
            Effect::AssignResource { group_id } => vec![("group_id", group_id.to_string())],
            Effect::ReleaseResource {
                group_id,
                processable_id,
            } => vec![
                ("group_id", group_id.to_string()),
                ("processable_id", processable_id.to_string()),
            ],
        }
    }
}

impl TracedEffect for Event {
    fn name(&self) -> &'static str {
        Event::name(self)
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Event::ResourceGroupCreated { id, project_id, key } => vec![
                ("group_id", id.to_string()),
                ("project_id", project_id.to_string()),
                ("key", key.clone()),
            ],
            Event::ProcessableCreated { id, group_id, .. } => {
                let mut fields = vec![("processable_id", id.to_string())];
                if let Some(group_id) = group_id {
                    fields.push(("group_id", group_id.to_string()));
                }
                fields
            }
            Event::ProcessableWaitingForResource { id, group_id } => vec![
                ("processable_id", id.to_string()),
                ("group_id", group_id.to_string()),
            ],
            Event::ProcessableEnqueued { id } | Event::ProcessableStarted { id } => {
                vec![("processable_id", id.to_string())]
            }
            Event::ProcessableFinished { id, status } => vec![
                ("processable_id", id.to_string()),
                ("status", status.to_string()),
            ],
            Event::ProcessableFailed { id, reason } => vec![
                ("processable_id", id.to_string()),
                ("reason", reason.to_string()),
            ],
            Event::ResourceAssigned {
                group_id,
                resource_id,
                processable_id,
            } => vec![
                ("group_id", group_id.to_string()),
                ("resource_id", resource_id.to_string()),
                ("processable_id", processable_id.to_string()),
            ],
            Event::ResourceReleased {
                group_id,
                processable_id,
            } => vec![
                ("group_id", group_id.to_string()),
                ("processable_id", processable_id.to_string()),
            ],
            Event::StaleHoldReclaimed {
                group_id,
                processable_id,
                status,
            } => vec![
                ("group_id", group_id.to_string()),
                ("processable_id", processable_id.to_string()),
                ("status", status.to_string()),
            ],
            Event::AssignmentDeferred {
                group_id,
                processable_id,
                reason,
            } => vec![
                ("group_id", group_id.to_string()),
                ("processable_id", processable_id.to_string()),
                ("reason", reason.clone()),
            ],
        }
    }
}
