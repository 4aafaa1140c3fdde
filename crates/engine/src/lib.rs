// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Resource group admission engine
//!
//! Executes effects produced by the core state machines, runs assignment
//! passes off the async runtime and re-runs them for groups that still have
//! waiting jobs.

mod error;
mod executor;
mod runtime;
mod scheduler;

pub use error::RuntimeError;
pub use executor::{ExecuteError, Executor};
pub use runtime::{Runtime, RuntimeConfig};
pub use scheduler::Scheduler;
