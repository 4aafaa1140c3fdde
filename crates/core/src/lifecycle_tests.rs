// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::assign::AssignResourceFromResourceGroup;
use crate::clock::FakeClock;
use crate::id::ResourceGroupId;
use crate::processable::{PipelineStatus, ProcessableStatus};
use crate::store::MemoryStore;

const PROJECT: ProjectId = ProjectId(1);

struct Fixture {
    store: MemoryStore,
    clock: FakeClock,
    policy: RetryPolicy,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            clock: FakeClock::new(),
            policy: RetryPolicy::without_backoff(3),
        }
    }

    fn lifecycle(&self) -> ProcessableLifecycle<'_, MemoryStore, FakeClock> {
        ProcessableLifecycle::new(&self.store, &self.clock, &self.policy)
    }

    fn assign(&self, group_id: ResourceGroupId) {
        AssignResourceFromResourceGroup::new(&self.store, &self.clock, &self.policy)
            .execute(group_id)
            .unwrap();
    }

    fn deploy_job(&self, pipeline: u64) -> Processable {
        let (job, _) = self
            .lifecycle()
            .create(
                PROJECT,
                NewJob {
                    pipeline_id: PipelineId(pipeline),
                    name: "deploy".to_string(),
                    resource_group_key: Some("production".to_string()),
                    variables: HashMap::new(),
                },
            )
            .unwrap();
        job
    }

    fn status(&self, id: ProcessableId) -> ProcessableStatus {
        self.store.processable(id).map(|p| p.status).unwrap()
    }
}

fn variables(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn create_expands_key_and_lazily_creates_group() {
    let f = Fixture::new();

    let (job, effects) = f
        .lifecycle()
        .create(
            PROJECT,
            NewJob {
                pipeline_id: PipelineId(1),
                name: "test".to_string(),
                resource_group_key: Some("$CI_COMMIT_REF_NAME-$CI_JOB_NAME".to_string()),
                variables: variables(&[("CI_COMMIT_REF_NAME", "master"), ("CI_JOB_NAME", "test")]),
            },
        )
        .unwrap();

    let group = f.store.find_group(PROJECT, "master-test").unwrap();
    assert_eq!(job.resource_group_id, Some(group.id));
    assert_eq!(job.status, ProcessableStatus::Created);
    assert_eq!(f.store.resources(group.id).len(), 1);
    assert!(f.store.resources(group.id)[0].is_free());

    let names: Vec<_> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::Emit(event) => Some(event.name()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["group:created", "job:created"]);
}

#[test]
fn second_job_reuses_the_group() {
    let f = Fixture::new();
    let first = f.deploy_job(1);

    let (second, effects) = f
        .lifecycle()
        .create(
            PROJECT,
            NewJob {
                pipeline_id: PipelineId(2),
                name: "deploy".to_string(),
                resource_group_key: Some("production".to_string()),
                variables: HashMap::new(),
            },
        )
        .unwrap();

    assert_eq!(first.resource_group_id, second.resource_group_id);
    assert_eq!(effects.len(), 1);
    assert_eq!(f.store.groups().len(), 1);
}

#[test]
fn empty_expanded_key_is_rejected() {
    let f = Fixture::new();

    let err = f
        .lifecycle()
        .create(
            PROJECT,
            NewJob {
                pipeline_id: PipelineId(1),
                name: "deploy".to_string(),
                resource_group_key: Some("$UNSET".to_string()),
                variables: HashMap::new(),
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        LifecycleError::EmptyResourceGroupKey {
            key: "$UNSET".to_string()
        }
    );
    assert!(f.store.groups().is_empty());
}

#[test]
fn enqueue_gates_grouped_jobs_on_their_resource() {
    let f = Fixture::new();
    let job = f.deploy_job(1);

    let (job, effects) = f.lifecycle().enqueue(job.id).unwrap();

    assert_eq!(job.status, ProcessableStatus::WaitingForResource);
    assert!(effects.contains(&Effect::AssignResource {
        group_id: job.resource_group_id.unwrap()
    }));
}

#[test]
fn enqueue_without_group_goes_straight_to_pending() {
    let f = Fixture::new();
    let (job, _) = f
        .lifecycle()
        .create(
            PROJECT,
            NewJob {
                pipeline_id: PipelineId(1),
                name: "lint".to_string(),
                ..NewJob::default()
            },
        )
        .unwrap();

    let (job, _) = f.lifecycle().enqueue(job.id).unwrap();

    assert_eq!(job.status, ProcessableStatus::Pending);
}

#[test]
fn finishing_releases_immediately_so_next_job_can_run() {
    let f = Fixture::new();
    let first = f.deploy_job(1);
    let second = f.deploy_job(2);
    let group_id = first.resource_group_id.unwrap();
    f.lifecycle().enqueue(first.id).unwrap();
    f.lifecycle().enqueue(second.id).unwrap();
    f.assign(group_id);
    assert_eq!(f.status(first.id), ProcessableStatus::Pending);
    assert_eq!(f.status(second.id), ProcessableStatus::WaitingForResource);

    f.lifecycle().run(first.id).unwrap();
    let (_, effects) = f.lifecycle().succeed(first.id).unwrap();

    assert_eq!(f.store.free_resource_count(group_id), 1);
    assert!(effects.contains(&Effect::ReleaseResource {
        group_id,
        processable_id: first.id
    }));
    f.assign(group_id);
    assert_eq!(f.status(second.id), ProcessableStatus::Pending);
}

#[test]
fn canceling_a_holder_frees_its_resource() {
    let f = Fixture::new();
    let job = f.deploy_job(1);
    let group_id = job.resource_group_id.unwrap();
    f.lifecycle().enqueue(job.id).unwrap();
    f.assign(group_id);

    let (job, _) = f.lifecycle().cancel(job.id).unwrap();

    assert_eq!(job.status, ProcessableStatus::Canceled);
    assert_eq!(f.store.free_resource_count(group_id), 1);
}

#[test]
fn drop_records_reason() {
    let f = Fixture::new();
    let job = f.deploy_job(1);

    let (job, _) = f
        .lifecycle()
        .drop(job.id, FailureReason::ScriptFailure)
        .unwrap();

    assert_eq!(job.status, ProcessableStatus::Failed);
    assert_eq!(job.failure_reason, Some(FailureReason::ScriptFailure));
}

#[test]
fn skip_is_rejected_once_running() {
    let f = Fixture::new();
    let job = f.deploy_job(1);
    f.lifecycle().enqueue(job.id).unwrap();
    f.assign(job.resource_group_id.unwrap());
    f.lifecycle().run(job.id).unwrap();

    let err = f.lifecycle().skip(job.id).unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Transition(TransitionError::InvalidTransition { .. })
    ));
}

#[test]
fn marking_a_waiting_job_outdated_requests_a_pass() {
    let f = Fixture::new();
    let holder = f.deploy_job(1);
    let waiting = f.deploy_job(2);
    let group_id = holder.resource_group_id.unwrap();
    f.lifecycle().enqueue(holder.id).unwrap();
    f.assign(group_id);
    f.lifecycle().enqueue(waiting.id).unwrap();

    let (job, effects) = f.lifecycle().mark_outdated_deployment(waiting.id).unwrap();

    assert!(job.has_outdated_deployment);
    assert_eq!(effects, vec![Effect::AssignResource { group_id }]);

    f.assign(group_id);
    assert_eq!(f.status(waiting.id), ProcessableStatus::Failed);
    assert_eq!(f.status(holder.id), ProcessableStatus::Pending);
}

#[test]
fn unknown_job_is_not_found() {
    let f = Fixture::new();
    let err = f.lifecycle().run(ProcessableId(42)).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Store(StoreError::NotFound { kind: "processable", .. })
    ));
}

#[test]
fn pipeline_reports_waiting_for_resource() {
    let f = Fixture::new();
    let holder = f.deploy_job(1);
    let waiting = f.deploy_job(2);
    f.lifecycle().enqueue(holder.id).unwrap();
    f.assign(holder.resource_group_id.unwrap());
    f.lifecycle().enqueue(waiting.id).unwrap();

    let statuses: Vec<_> = f
        .store
        .pipeline_processables(PipelineId(2))
        .iter()
        .map(|p| p.status)
        .collect();

    assert_eq!(
        PipelineStatus::composite(&statuses),
        PipelineStatus::WaitingForResource
    );
}
