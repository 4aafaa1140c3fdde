// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Respawn timers, one per resource group

use rgate_core::ResourceGroupId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Pending re-runs of assignment passes
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<ResourceGroupId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `group_id`; an earlier pending deadline wins
    pub fn set_timer(&mut self, group_id: ResourceGroupId, after: Duration, now: Instant) {
        let deadline = now + after;
        self.timers
            .entry(group_id)
            .and_modify(|at| *at = (*at).min(deadline))
            .or_insert(deadline);
    }

    pub fn cancel_timer(&mut self, group_id: ResourceGroupId) {
        self.timers.remove(&group_id);
    }

    /// Remove and return every group whose deadline is at or before `now`
    pub fn fired_timers(&mut self, now: Instant) -> Vec<ResourceGroupId> {
        let mut fired: Vec<_> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &fired {
            self.timers.remove(id);
        }
        fired.sort();
        fired
    }

    pub fn has_timer(&self, group_id: ResourceGroupId) -> bool {
        self.timers.contains_key(&group_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
