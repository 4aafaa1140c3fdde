// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rgate_core::{
    FakeClock, MemoryStore, NewJob, PipelineId, ProcessableId, ProcessableLifecycle,
    ProcessableStatus, ProjectId,
};

fn setup() -> Executor<MemoryStore, FakeClock> {
    Executor::new(
        Arc::new(MemoryStore::new()),
        FakeClock::new(),
        RetryPolicy::without_backoff(3),
    )
}

/// Create and enqueue a `deploy` job in the `production` group
fn waiting_job(
    executor: &Executor<MemoryStore, FakeClock>,
    pipeline: u64,
) -> (ProcessableId, ResourceGroupId) {
    let lifecycle =
        ProcessableLifecycle::new(&**executor.store(), executor.clock(), executor.policy());
    let (job, _) = lifecycle
        .create(
            ProjectId(1),
            NewJob {
                pipeline_id: PipelineId(pipeline),
                name: "deploy".to_string(),
                resource_group_key: Some("production".to_string()),
                ..NewJob::default()
            },
        )
        .unwrap();
    lifecycle.enqueue(job.id).unwrap();
    (job.id, job.resource_group_id.unwrap())
}

#[tokio::test]
async fn assign_effect_requests_a_pass_without_running_it() {
    let executor = setup();
    let (job, group_id) = waiting_job(&executor, 1);

    let requested = executor
        .execute(Effect::AssignResource { group_id })
        .await
        .unwrap();

    assert_eq!(requested, Some(group_id));
    let status = executor.store().processable(job).map(|p| p.status);
    assert_eq!(status, Some(ProcessableStatus::WaitingForResource));
}

#[tokio::test]
async fn emit_effect_has_no_follow_up() {
    let executor = setup();

    let requested = executor
        .execute(Effect::Emit(Event::ProcessableEnqueued {
            id: ProcessableId(1),
        }))
        .await
        .unwrap();

    assert_eq!(requested, None);
}

#[tokio::test]
async fn run_pass_admits_the_waiting_job() {
    let executor = setup();
    let (job, group_id) = waiting_job(&executor, 1);

    let report = executor.run_pass(group_id).await.unwrap();

    assert_eq!(report.assigned.len(), 1);
    assert_eq!(report.assigned[0].0, job);
    assert!(!report.has_waiting());
}

#[tokio::test]
async fn release_effect_frees_the_resource() {
    let executor = setup();
    let (job, group_id) = waiting_job(&executor, 1);
    executor.run_pass(group_id).await.unwrap();
    assert_eq!(executor.store().free_resource_count(group_id), 0);

    executor
        .execute(Effect::ReleaseResource {
            group_id,
            processable_id: job,
        })
        .await
        .unwrap();

    assert_eq!(executor.store().free_resource_count(group_id), 1);
}

#[tokio::test]
async fn pass_for_unknown_group_fails() {
    let executor = setup();

    let err = executor.run_pass(ResourceGroupId(99)).await.unwrap_err();

    assert!(matches!(
        err,
        ExecuteError::Assign(AssignError::GroupNotFound(ResourceGroupId(99)))
    ));
}
