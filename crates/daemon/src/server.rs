// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use rgate_core::{
    LifecycleError, NewJob, PipelineStatus, ProcessableLifecycle, ResourceStore, SystemClock,
    Transitioned,
};
use rgate_engine::RuntimeError;
use rgate_storage::WalStore;
use tokio::net::UnixStream;
use tracing::{debug, error};

use crate::lifecycle::DaemonState;
use crate::protocol::{
    self, GroupDetail, GroupSummary, Query, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Handle a single client connection
pub async fn handle_connection(
    daemon: &mut DaemonState,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!("Received request: {:?}", request);

    let response = handle_request(daemon, request).await;

    debug!("Sending response: {:?}", response);

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request(daemon: &mut DaemonState, request: Request) -> Response {
    let transitioned = match request {
        Request::Ping => return Response::Pong,

        Request::Hello { version: _ } => {
            return Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            }
        }

        Request::Shutdown => {
            daemon.shutdown_requested = true;
            return Response::ShuttingDown;
        }

        Request::Status => return status(daemon),

        Request::Query { query } => return handle_query(daemon, query),

        Request::Assign { group_id } => {
            return match daemon.runtime.assign(group_id).await {
                Ok(_) => Response::Ok,
                Err(e) => Response::error(e),
            }
        }

        Request::ChangeProcessMode { group_id, mode } => {
            return match daemon.runtime.store().change_process_mode(group_id, mode) {
                Ok(_) => Response::Ok,
                Err(e) => Response::error(e),
            }
        }

        Request::CreateJob { job } => {
            let new = NewJob {
                pipeline_id: job.pipeline_id,
                name: job.name,
                resource_group_key: job.resource_group,
                variables: job.variables,
            };
            let project_id = job.project_id;
            lifecycle(daemon, move |l| l.create(project_id, new)).await
        }
        Request::Enqueue { id } => lifecycle(daemon, move |l| l.enqueue(id)).await,
        Request::Run { id } => lifecycle(daemon, move |l| l.run(id)).await,
        Request::Succeed { id } => lifecycle(daemon, move |l| l.succeed(id)).await,
        Request::Drop { id, reason } => lifecycle(daemon, move |l| l.drop(id, reason)).await,
        Request::Cancel { id } => lifecycle(daemon, move |l| l.cancel(id)).await,
        Request::Skip { id } => lifecycle(daemon, move |l| l.skip(id)).await,
        Request::MarkOutdated { id } => {
            lifecycle(daemon, move |l| l.mark_outdated_deployment(id)).await
        }
    };

    respond_with_job(daemon, transitioned).await
}

type JobLifecycle<'a> = ProcessableLifecycle<'a, WalStore, SystemClock>;

/// Lifecycle calls sleep on lock retries and fsync the log; keep them off the async workers
async fn lifecycle<F>(daemon: &DaemonState, op: F) -> Result<Transitioned, RuntimeError>
where
    F: FnOnce(&JobLifecycle<'_>) -> Result<Transitioned, LifecycleError> + Send + 'static,
{
    daemon.runtime.run_lifecycle(op).await
}

/// Run the effects of a lifecycle call and answer with the job's latest state
async fn respond_with_job(
    daemon: &DaemonState,
    transitioned: Result<Transitioned, RuntimeError>,
) -> Response {
    let (job, effects) = match transitioned {
        Ok(t) => t,
        Err(e) => return Response::error(e),
    };
    if let Err(e) = daemon.process_effects(effects).await {
        return Response::error(e);
    }
    // A pass may have admitted the job in the meantime
    let job = daemon.runtime.store().processable(job.id).unwrap_or(job);
    Response::Job {
        job: Some(Box::new(job)),
    }
}

fn status(daemon: &DaemonState) -> Response {
    let store = daemon.runtime.store();
    let groups = store.groups();
    let waiting = groups
        .iter()
        .map(|g| store.upcoming_processables(g.id).len())
        .sum();
    let holding = groups
        .iter()
        .map(|g| (g.capacity as usize).saturating_sub(store.free_resource_count(g.id)))
        .sum();

    Response::Status {
        uptime_secs: daemon.start_time.elapsed().as_secs(),
        groups: groups.len(),
        waiting,
        holding,
    }
}

/// Handle query requests
fn handle_query(daemon: &DaemonState, query: Query) -> Response {
    let store = daemon.runtime.store();

    match query {
        Query::ListGroups => {
            let groups = store
                .groups()
                .into_iter()
                .map(|g| GroupSummary {
                    free: store.free_resource_count(g.id),
                    waiting: store.upcoming_processables(g.id).len(),
                    id: g.id,
                    project_id: g.project_id,
                    key: g.key,
                    process_mode: g.process_mode,
                    capacity: g.capacity,
                })
                .collect();
            Response::Groups { groups }
        }

        Query::GetGroup { id } => {
            let group = store.group(id).map(|group| {
                Box::new(GroupDetail {
                    resources: store.resources(id),
                    upcoming: store
                        .upcoming_processables(id)
                        .into_iter()
                        .map(|p| p.id)
                        .collect(),
                    group,
                })
            });
            Response::Group { group }
        }

        Query::GetJob { id } => Response::Job {
            job: store.processable(id).map(Box::new),
        },

        Query::GetPipeline { id } => {
            let jobs = store.pipeline_processables(id);
            let statuses: Vec<_> = jobs.iter().map(|p| p.status).collect();
            Response::Pipeline {
                status: PipelineStatus::composite(&statuses),
                jobs: jobs.iter().map(|p| p.id).collect(),
            }
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
