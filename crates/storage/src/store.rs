// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-backed resource store

use crate::wal::{Wal, WalError};
use rgate_core::{JournaledStore, MaterializedState};
use std::path::Path;

/// Store whose operations survive a restart
pub type WalStore = JournaledStore<Wal>;

/// Replay the log at `path` and resume appending to it
pub fn open(path: &Path) -> Result<WalStore, WalError> {
    let ops = Wal::replay(path)?;
    let state = MaterializedState::replay(&ops);
    let wal = Wal::open(path)?;

    tracing::info!(
        path = %path.display(),
        operations = ops.len(),
        groups = state.groups.len(),
        processables = state.processables.len(),
        sequence = wal.sequence(),
        "replayed write-ahead log"
    );
    Ok(JournaledStore::with_log(state, wal))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
