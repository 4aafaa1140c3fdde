// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rgate daemon library: wire protocol, startup and request handling

pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use lifecycle::{startup, DaemonRuntime, DaemonState, LifecycleError};
pub use protocol::{
    GroupDetail, GroupSummary, JobSpec, ProtocolError, Query, Request, Response,
    PROTOCOL_VERSION,
};
pub use server::{handle_connection, handle_request, ServerError};
