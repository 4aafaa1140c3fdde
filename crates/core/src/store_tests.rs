// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::processable::ProcessableStatus;
use std::collections::HashSet;

const PROJECT: ProjectId = ProjectId(1);

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn waiting_job(store: &MemoryStore, group_id: ResourceGroupId) -> Processable {
    let job = store
        .insert_processable(
            NewProcessable::new(PipelineId(1), "deploy").with_resource_group(group_id),
            epoch(),
        )
        .unwrap();
    store
        .update_processable(&Processable {
            status: ProcessableStatus::WaitingForResource,
            enqueued_at: Some(epoch()),
            ..job
        })
        .unwrap()
}

fn pending(job: &Processable) -> Processable {
    Processable {
        status: ProcessableStatus::Pending,
        ..job.clone()
    }
}

#[test]
fn find_or_create_group_is_idempotent() {
    let store = MemoryStore::new();

    let first = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    let second = store
        .find_or_create_group(PROJECT, "production", ProcessMode::NewestFirst, 5)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.groups().len(), 1);
    assert_eq!(store.resources(first.id).len(), 1);
}

#[test]
fn lazily_created_group_has_one_free_resource() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "master-test", ProcessMode::default(), 1)
        .unwrap();

    let resources = store.resources(group.id);
    assert_eq!(resources.len(), 1);
    assert!(resources[0].processable_id.is_none());
    assert_eq!(store.free_resource_count(group.id), 1);
}

#[test]
fn same_key_in_another_project_is_a_different_group() {
    let store = MemoryStore::new();
    let a = store
        .find_or_create_group(ProjectId(1), "production", ProcessMode::Unordered, 1)
        .unwrap();
    let b = store
        .find_or_create_group(ProjectId(2), "production", ProcessMode::Unordered, 1)
        .unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn assign_resource_writes_processable_and_holder() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    let job = waiting_job(&store, group.id);

    let (stored, resource_id) = store.assign_resource(group.id, &pending(&job)).unwrap();

    assert_eq!(stored.status, ProcessableStatus::Pending);
    assert_eq!(stored.lock_version, job.lock_version + 1);
    assert!(store
        .resources(group.id)
        .iter()
        .any(|r| r.id == resource_id && r.is_held_by(job.id)));
}

#[test]
fn release_resource_from_is_idempotent() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    let job = waiting_job(&store, group.id);
    store.assign_resource(group.id, &pending(&job)).unwrap();

    assert!(store.release_resource_from(group.id, job.id).unwrap());
    assert!(!store.release_resource_from(group.id, job.id).unwrap());
    assert_eq!(store.free_resource_count(group.id), 1);
}

#[test]
fn change_process_mode_returns_updated_group() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();

    let changed = store
        .change_process_mode(group.id, ProcessMode::OldestFirst)
        .unwrap();

    assert_eq!(changed.process_mode, ProcessMode::OldestFirst);
    assert_eq!(store.group(group.id), Some(changed));
}

#[test]
fn change_process_mode_rejected_while_a_resource_is_held() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    let job = waiting_job(&store, group.id);
    store.assign_resource(group.id, &pending(&job)).unwrap();

    let err = store
        .change_process_mode(group.id, ProcessMode::NewestFirst)
        .unwrap_err();
    assert!(matches!(err, StoreError::ProcessModeLocked { .. }));
}

#[test]
fn pipeline_processables_span_groups() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    waiting_job(&store, group.id);
    store
        .insert_processable(NewProcessable::new(PipelineId(1), "lint"), epoch())
        .unwrap();
    store
        .insert_processable(NewProcessable::new(PipelineId(2), "lint"), epoch())
        .unwrap();

    assert_eq!(store.pipeline_processables(PipelineId(1)).len(), 2);
    assert_eq!(store.processables(group.id).len(), 1);
}

struct Recording(Vec<&'static str>);

impl OperationLog for Recording {
    fn append(&mut self, op: &Operation) -> Result<(), StoreError> {
        self.0.push(op.name());
        Ok(())
    }
}

#[test]
fn every_write_is_journaled_once() {
    let store = JournaledStore::with_log(MaterializedState::default(), Recording(Vec::new()));
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap();
    let job = store
        .insert_processable(
            NewProcessable::new(PipelineId(1), "deploy").with_resource_group(group.id),
            epoch(),
        )
        .unwrap();
    store.release_resource_from(group.id, job.id).unwrap();

    let log = store.lock().log.0.clone();
    assert_eq!(log, vec!["group_create", "processable_insert"]);
}

struct Failing;

impl OperationLog for Failing {
    fn append(&mut self, _op: &Operation) -> Result<(), StoreError> {
        Err(StoreError::Journal("disk full".to_string()))
    }
}

#[test]
fn failed_journal_write_leaves_state_untouched() {
    let store = JournaledStore::with_log(MaterializedState::default(), Failing);

    let err = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 1)
        .unwrap_err();

    assert_eq!(err, StoreError::Journal("disk full".to_string()));
    assert!(store.groups().is_empty());
}

#[test]
fn concurrent_assigners_never_double_book() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 2)
        .unwrap();
    let jobs: Vec<_> = (0..16).map(|_| waiting_job(&store, group.id)).collect();

    let assigned: Vec<ProcessableId> = std::thread::scope(|s| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|job| {
                let store = &store;
                s.spawn(move || {
                    store
                        .assign_resource(group.id, &pending(job))
                        .ok()
                        .map(|(p, _)| p.id)
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(assigned.len(), 2);
    let holders: HashSet<_> = store
        .resources(group.id)
        .iter()
        .filter_map(|r| r.processable_id)
        .collect();
    assert_eq!(holders, assigned.into_iter().collect());
}

#[test]
fn concurrent_writers_of_one_processable_conflict() {
    let store = MemoryStore::new();
    let group = store
        .find_or_create_group(PROJECT, "production", ProcessMode::Unordered, 4)
        .unwrap();
    let job = waiting_job(&store, group.id);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = &store;
                let job = &job;
                s.spawn(move || store.assign_resource(group.id, &pending(job)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(StoreError::is_stale));
    assert_eq!(store.free_resource_count(group.id), 3);
}
