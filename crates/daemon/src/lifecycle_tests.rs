// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rgate_core::{GroupConfig, NewJob, PipelineId, ProcessMode, ProjectId};
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> Config {
    let mut config = Config::with_state_dir(dir);
    config.resource_groups.push(GroupConfig {
        project: ProjectId(1),
        key: "production".to_string(),
        process_mode: ProcessMode::OldestFirst,
        capacity: 2,
    });
    config
}

#[tokio::test]
async fn startup_creates_runtime_files_and_configured_groups() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());

    let daemon = startup(&config).await.unwrap();

    assert!(config.socket_path().exists());
    let pid = std::fs::read_to_string(config.pid_path()).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());

    let group = daemon
        .runtime
        .store()
        .find_group(ProjectId(1), "production")
        .unwrap();
    assert_eq!(group.capacity, 2);
    assert_eq!(group.process_mode, ProcessMode::OldestFirst);
    assert_eq!(daemon.runtime.store().resources(group.id).len(), 2);
}

#[tokio::test]
async fn second_daemon_fails_to_lock_and_leaves_files() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let _daemon = startup(&config).await.unwrap();

    let err = startup(&config).await.err().unwrap();

    assert!(matches!(err, LifecycleError::LockFailed(_)));
    assert!(config.socket_path().exists());
    assert!(config.pid_path().exists());
}

#[tokio::test]
async fn shutdown_removes_socket_and_pid_file() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let mut daemon = startup(&config).await.unwrap();

    daemon.shutdown().await.unwrap();

    assert!(!config.socket_path().exists());
    assert!(!config.pid_path().exists());
}

#[tokio::test]
async fn restart_reconciles_jobs_waiting_in_the_log() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());

    let job = {
        let mut daemon = startup(&config).await.unwrap();
        let new = NewJob {
            pipeline_id: PipelineId(1),
            name: "deploy".to_string(),
            resource_group_key: Some("production".to_string()),
            ..NewJob::default()
        };
        let (job, _) = daemon
            .runtime
            .run_lifecycle(move |l| l.create(ProjectId(1), new))
            .await
            .unwrap();
        // Crash before the requested pass runs
        let id = job.id;
        daemon.runtime.run_lifecycle(move |l| l.enqueue(id)).await.unwrap();
        daemon.shutdown().await.unwrap();
        job
    };

    let daemon = startup(&config).await.unwrap();

    let job = daemon.runtime.store().processable(job.id).unwrap();
    assert_eq!(job.status, rgate_core::ProcessableStatus::Pending);
    assert_eq!(daemon.runtime.store().groups().len(), 1);
}
