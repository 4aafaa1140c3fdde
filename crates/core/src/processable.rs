// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processable state machine
//!
//! A processable is a schedulable unit of pipeline work (a CI job or a
//! bridge). The pipeline executor drives most transitions; the assignment
//! service is the only caller that moves a processable out of
//! `WaitingForResource` and into `Pending`.

use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::id::{PipelineId, ProcessableId, ResourceGroupId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a processable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessableStatus {
    Created,
    /// Gated on a resource group, holds no resource
    WaitingForResource,
    /// Enqueued for a runner
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
}

impl ProcessableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessableStatus::Created => "created",
            ProcessableStatus::WaitingForResource => "waiting_for_resource",
            ProcessableStatus::Pending => "pending",
            ProcessableStatus::Running => "running",
            ProcessableStatus::Success => "success",
            ProcessableStatus::Failed => "failed",
            ProcessableStatus::Canceled => "canceled",
            ProcessableStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessableStatus::Success
                | ProcessableStatus::Failed
                | ProcessableStatus::Canceled
                | ProcessableStatus::Skipped
        )
    }

    /// Statuses in which holding a resource is legitimate
    pub fn is_active(&self) -> bool {
        matches!(self, ProcessableStatus::Pending | ProcessableStatus::Running)
    }
}

impl std::fmt::Display for ProcessableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a processable ended up `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ScriptFailure,
    /// Superseded by a newer deployment to the same environment
    OutdatedDeployment,
    /// The resource group can never admit a job
    ResourceGroupMisconfigured,
    UnknownFailure,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::ScriptFailure => "script_failure",
            FailureReason::OutdatedDeployment => "outdated_deployment",
            FailureReason::ResourceGroupMisconfigured => "resource_group_misconfigured",
            FailureReason::UnknownFailure => "unknown_failure",
        };
        f.write_str(s)
    }
}

/// Attributes for a processable that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcessable {
    pub pipeline_id: PipelineId,
    pub name: String,
    pub resource_group_id: Option<ResourceGroupId>,
    pub has_outdated_deployment: bool,
}

impl NewProcessable {
    pub fn new(pipeline_id: PipelineId, name: impl Into<String>) -> Self {
        Self {
            pipeline_id,
            name: name.into(),
            resource_group_id: None,
            has_outdated_deployment: false,
        }
    }

    pub fn with_resource_group(mut self, group_id: ResourceGroupId) -> Self {
        self.resource_group_id = Some(group_id);
        self
    }

    pub fn with_outdated_deployment(mut self, outdated: bool) -> Self {
        self.has_outdated_deployment = outdated;
        self
    }
}

/// A schedulable unit of pipeline work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processable {
    pub id: ProcessableId,
    pub pipeline_id: PipelineId,
    pub name: String,
    pub resource_group_id: Option<ResourceGroupId>,
    pub status: ProcessableStatus,
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    /// When the processable entered `WaitingForResource`
    pub enqueued_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub has_outdated_deployment: bool,
    /// Bumped by the store on every successful write
    pub lock_version: u64,
}

/// Events that can change processable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessableEvent {
    /// The resource-group gate was reached
    RequestResource,
    /// Dispatch for execution
    Enqueue,
    /// A runner picked the processable up
    Run,
    Succeed,
    Drop { reason: FailureReason },
    Cancel,
    Skip,
}

impl ProcessableEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessableEvent::RequestResource => "request_resource",
            ProcessableEvent::Enqueue => "enqueue",
            ProcessableEvent::Run => "run",
            ProcessableEvent::Succeed => "succeed",
            ProcessableEvent::Drop { .. } => "drop",
            ProcessableEvent::Cancel => "cancel",
            ProcessableEvent::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {event} {id} from {from}")]
    InvalidTransition {
        id: ProcessableId,
        from: ProcessableStatus,
        event: &'static str,
    },
    #[error("{0} does not belong to a resource group")]
    NoResourceGroup(ProcessableId),
}

impl Processable {
    /// Build the stored form of a new processable
    pub fn create(id: ProcessableId, new: NewProcessable, created_at: DateTime<Utc>) -> Self {
        Processable {
            id,
            pipeline_id: new.pipeline_id,
            name: new.name,
            resource_group_id: new.resource_group_id,
            status: ProcessableStatus::Created,
            failure_reason: None,
            created_at,
            enqueued_at: None,
            finished_at: None,
            has_outdated_deployment: new.has_outdated_deployment,
            lock_version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_waiting_for_resource(&self) -> bool {
        self.status == ProcessableStatus::WaitingForResource
    }

    pub fn with_resource_group(&self) -> bool {
        self.resource_group_id.is_some()
    }

    /// Pure transition function - returns new state and effects
    pub fn transition(
        &self,
        event: ProcessableEvent,
        clock: &impl Clock,
    ) -> Result<(Processable, Vec<Effect>), TransitionError> {
        use ProcessableStatus as S;

        let now = clock.utc_now();
        let invalid = || TransitionError::InvalidTransition {
            id: self.id,
            from: self.status,
            event: event.name(),
        };

        match (self.status, event) {
            // Created → WaitingForResource
            (S::Created, ProcessableEvent::RequestResource) => {
                let group_id = self
                    .resource_group_id
                    .ok_or(TransitionError::NoResourceGroup(self.id))?;
                let next = Processable {
                    status: S::WaitingForResource,
                    enqueued_at: Some(now),
                    ..self.clone()
                };
                let effects = vec![
                    Effect::Emit(Event::ProcessableWaitingForResource {
                        id: self.id,
                        group_id,
                    }),
                    Effect::AssignResource { group_id },
                ];
                Ok((next, effects))
            }

            // Created/WaitingForResource → Pending
            (S::Created | S::WaitingForResource, ProcessableEvent::Enqueue) => {
                let next = Processable {
                    status: S::Pending,
                    ..self.clone()
                };
                let effects = vec![Effect::Emit(Event::ProcessableEnqueued { id: self.id })];
                Ok((next, effects))
            }

            // Pending → Running
            (S::Pending, ProcessableEvent::Run) => {
                let next = Processable {
                    status: S::Running,
                    ..self.clone()
                };
                let effects = vec![Effect::Emit(Event::ProcessableStarted { id: self.id })];
                Ok((next, effects))
            }

            // Running → Success
            (S::Running, ProcessableEvent::Succeed) => {
                Ok(self.finish(S::Success, None, now, Event::ProcessableFinished {
                    id: self.id,
                    status: S::Success,
                }))
            }

            // Any non-terminal → Failed
            (status, ProcessableEvent::Drop { reason }) if !status.is_terminal() => {
                Ok(self.finish(S::Failed, Some(reason), now, Event::ProcessableFailed {
                    id: self.id,
                    reason,
                }))
            }

            // Any non-terminal → Canceled
            (status, ProcessableEvent::Cancel) if !status.is_terminal() => {
                Ok(self.finish(S::Canceled, None, now, Event::ProcessableFinished {
                    id: self.id,
                    status: S::Canceled,
                }))
            }

            // Not yet dispatched → Skipped
            (S::Created | S::WaitingForResource, ProcessableEvent::Skip) => {
                Ok(self.finish(S::Skipped, None, now, Event::ProcessableFinished {
                    id: self.id,
                    status: S::Skipped,
                }))
            }

            _ => Err(invalid()),
        }
    }

    fn finish(
        &self,
        status: ProcessableStatus,
        failure_reason: Option<FailureReason>,
        now: DateTime<Utc>,
        event: Event,
    ) -> (Processable, Vec<Effect>) {
        let next = Processable {
            status,
            failure_reason,
            finished_at: Some(now),
            ..self.clone()
        };

        let mut effects = vec![Effect::Emit(event)];
        // Only active processables can hold a resource
        if let (true, Some(group_id)) = (self.status.is_active(), self.resource_group_id) {
            effects.push(Effect::ReleaseResource {
                group_id,
                processable_id: self.id,
            });
            effects.push(Effect::AssignResource { group_id });
        }
        (next, effects)
    }
}

/// Aggregate status of a pipeline, derived from its processables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Created,
    WaitingForResource,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
}

impl PipelineStatus {
    /// Compose a pipeline status from the statuses of its processables
    pub fn composite(statuses: &[ProcessableStatus]) -> Self {
        use ProcessableStatus as S;

        let all = |pred: fn(&S) -> bool| statuses.iter().all(pred);
        let any = |status: S| statuses.contains(&status);

        if statuses.is_empty() || all(|s| *s == S::Created) {
            return PipelineStatus::Created;
        }
        if all(|s| *s == S::Skipped) {
            return PipelineStatus::Skipped;
        }
        if all(|s| matches!(s, S::Success | S::Skipped)) {
            return PipelineStatus::Success;
        }
        if all(S::is_terminal) {
            if any(S::Failed) {
                return PipelineStatus::Failed;
            }
            return PipelineStatus::Canceled;
        }
        if any(S::Running) {
            PipelineStatus::Running
        } else if any(S::Pending) {
            PipelineStatus::Pending
        } else if any(S::WaitingForResource) {
            PipelineStatus::WaitingForResource
        } else {
            // Created jobs mixed with finished ones: the pipeline is progressing
            PipelineStatus::Running
        }
    }
}

#[cfg(test)]
#[path = "processable_tests.rs"]
mod tests;
