// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rgate-core: resource-group job admission
//!
//! This crate provides:
//! - Resource groups, their resource pools and the processable state machine
//! - The store trait with an in-memory implementation over replayable operations
//! - The assignment and lifecycle services
//! - Optimistic-lock retries, key expansion and configuration

pub mod clock;
pub mod config;
pub mod id;
pub mod variables;

// Domain model (order matters for dependencies)
pub mod group;
pub mod processable;
pub mod effect;
pub mod traced;

// Persistence
pub mod operation;
pub mod state;
pub mod store;

// Services
pub mod optimistic;
pub mod assign;
pub mod lifecycle;

// Re-exports
pub use assign::{AssignError, AssignResourceFromResourceGroup, AssignmentReport};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    Config, ConfigError, GroupConfig, DEFAULT_RESPAWN_INTERVAL, DEFAULT_SWEEP_INTERVAL,
};
pub use effect::{Effect, Event};
pub use group::{ProcessMode, Resource, ResourceGroup, DEFAULT_CAPACITY};
pub use id::{PipelineId, ProcessableId, ProjectId, ResourceGroupId, ResourceId};
pub use lifecycle::{LifecycleError, NewJob, ProcessableLifecycle, Transitioned};
pub use operation::Operation;
pub use optimistic::{retry_lock, Conflict, LockError, RetryPolicy};
pub use processable::{
    FailureReason, NewProcessable, PipelineStatus, Processable, ProcessableEvent,
    ProcessableStatus, TransitionError,
};
pub use state::MaterializedState;
pub use store::{JournaledStore, MemoryStore, OperationLog, ResourceStore, StoreError, Volatile};
pub use traced::TracedEffect;
