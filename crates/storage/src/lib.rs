// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage for rgate
//!
//! Store operations are appended to a write-ahead log before they are
//! applied; on startup the log is replayed into the materialized state.

mod store;
mod wal;

pub use store::{open, WalStore};
pub use wal::{Wal, WalError};
