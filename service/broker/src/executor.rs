//! The Submission Executor: the per-submission state machine of spec's
//! §4.1. One `run()` task drives one submission from `created` through to a
//! terminal state and handoff to the Cleanup Scheduler; `synchronize`,
//! `stop_application`, `terminate_job`, `errors`, and `delete_job_resources`
//! are each callable independently (from a route handler, a rehydrate pass,
//! or the cleanup tick) against the submission's shared handle.

use crate::config;
use crate::errors::{fatal, provisioning, transient};
use crate::submission::{Status as SubmissionStatus, Submission};
use chrono::Utc;
use error::*;
use log::{error, info, warn};
use orchestrator::{job, provision, JobExt};
use result::Result;
use sidecar::SidecarClient;
use std::sync::Arc;
use tokio::sync::Mutex;
use workqueue::WorkQueue;

const WORK_QUEUE_IMAGE: &str = "redis:6-alpine";
const WORK_QUEUE_PORT: u16 = 6379;
const METRICS_DB_IMAGE: &str = "redis:6-alpine";
const METRICS_DB_PORT: u16 = 6379;
const MONITOR_COLLECT_PERIOD_SECONDS: u64 = 1;

struct Sidecars {
    monitor: SidecarClient,
    controller: SidecarClient,
    visualizer: SidecarClient,
}

fn sidecars() -> Sidecars {
    let config = config::get();
    Sidecars {
        monitor: SidecarClient::monitor(config.monitor_base),
        controller: SidecarClient::controller(config.controller_base),
        visualizer: SidecarClient::visualizer(config.visualizer_base),
    }
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("the work queue was never provisioned for submission '{app_id}'")]
#[code(Status::InternalServerError)]
struct QueueNotProvisioned {
    app_id: String,
}

fn work_queue_for(submission: &Submission) -> Result<WorkQueue> {
    let not_provisioned = || {
        fatal(
            submission.app_id.as_str(),
            QueueNotProvisioned {
                app_id: submission.app_id.clone(),
            },
        )
    };
    let ip = submission.queue_ip.as_ref().ok_or_else(not_provisioned)?;
    let port = submission.queue_port.ok_or_else(not_provisioned)?;
    WorkQueue::new(ip, port)
}

/// Entry point for a spawned driver task: runs `start_application`'s
/// remaining steps to completion, catching anything unhandled and
/// transitioning the submission to `error` rather than letting the task
/// panic silently (spec's §7 propagation policy for `fatal_internal`).
pub async fn run(app_id: String) {
    let handle = match crate::registry::get(&app_id).await {
        Some(handle) => handle,
        None => {
            error!("driver task spawned for unknown submission {}", app_id);
            return;
        }
    };
    if let Err(err) = drive(&handle).await {
        mark_error(&handle, err).await;
    }
}

async fn mark_error(handle: &Arc<Mutex<Submission>>, err: Box<dyn ChronosError>) {
    let mut submission = handle.lock().await;
    error!("submission {} entered error state: {}", submission.app_id, err);
    submission.status = SubmissionStatus::Error;
    submission.terminated = true;
    submission.finish_time = Some(Utc::now());
    if let Err(persist_err) = crate::registry::persist(&submission).await {
        error!("failed to persist error state for {}: {}", submission.app_id, persist_err);
    }
}

/// Runs steps 1-12 of `start_application` for a submission that has already
/// been constructed (`Submission::new`), persisted, and inserted into the
/// registry by the admission front-end.
async fn drive(handle: &Arc<Mutex<Submission>>) -> Result<()> {
    let app_id = handle.lock().await.app_id.clone();

    // Step 1: activate the requested cluster profile, if any.
    let cluster_name = handle.lock().await.payload.cluster_name.clone();
    if let Some(name) = cluster_name {
        crate::cluster::activate(&name).await.map_err(|e| provisioning(app_id.as_str(), e))?;
    }

    // Step 2: inject well-known environment variables.
    {
        let mut submission = handle.lock().await;
        submission
            .payload
            .env_vars
            .insert("WORK_QUEUE_HOST".to_string(), format!("queue-{}", app_id));
        if let Some(config_id) = submission.payload.config_id.clone() {
            submission.payload.env_vars.insert("CONFIG_ID".to_string(), config_id);
        }
    }
    crate::registry::persist(&*handle.lock().await).await?;

    // Step 3: provision the work queue.
    let queue_pod = provision::provision_work_queue(&app_id, WORK_QUEUE_IMAGE, WORK_QUEUE_PORT)
        .await
        .map_err(|e| provisioning(app_id.as_str(), e))?;
    {
        use orchestrator::PodExt;
        let mut submission = handle.lock().await;
        submission.queue_ip = Some(queue_pod.dns().map_err(|e| provisioning(app_id.as_str(), e))?);
        submission.queue_port = Some(WORK_QUEUE_PORT);
    }
    crate::registry::persist(&*handle.lock().await).await?;

    // Step 4: provision a metrics database when detailed reporting is wanted.
    let enable_visualizer = handle.lock().await.payload.enable_visualizer;
    if enable_visualizer {
        provision::provision_metrics_db(&app_id, METRICS_DB_IMAGE, METRICS_DB_PORT)
            .await
            .map_err(|e| provisioning(app_id.as_str(), e))?;
    }

    // Step 5: fold the resolved endpoints/credentials/metadata into the
    // monitor/visualizer sub-records.
    {
        let mut submission = handle.lock().await;
        let queue_ip = submission.queue_ip.clone();
        let queue_port = submission.queue_port;
        if let serde_json::Value::Object(map) = &mut submission.payload.monitor_info {
            map.insert("app_id".to_string(), serde_json::json!(app_id));
            map.insert("queue_ip".to_string(), serde_json::json!(queue_ip));
            map.insert("queue_port".to_string(), serde_json::json!(queue_port));
        }
        if let Some(serde_json::Value::Object(map)) = submission.payload.visualizer_info.as_mut() {
            map.insert("app_id".to_string(), serde_json::json!(app_id));
        }
    }

    // Step 6: start the visualizer sidecar, if enabled.
    let clients = sidecars();
    if enable_visualizer {
        let visualizer_info = handle
            .lock()
            .await
            .payload
            .visualizer_info
            .clone()
            .unwrap_or(serde_json::Value::Null);
        clients
            .visualizer
            .start(&app_id, &visualizer_info, MONITOR_COLLECT_PERIOD_SECONDS)
            .await
            .map_err(|e| transient(app_id.as_str(), "visualizer", e))?;
        let url = clients
            .visualizer
            .visualizer_url(&app_id)
            .await
            .map_err(|e| transient(app_id.as_str(), "visualizer", e))?;
        handle.lock().await.visualizer_url = Some(url);
        crate::registry::persist(&*handle.lock().await).await?;
    }

    // Step 7: fetch the workload item list and push it to the work queue.
    let redis_workload = handle.lock().await.payload.redis_workload.clone();
    let items = fetch_workload(&redis_workload).await.map_err(|e| provisioning(app_id.as_str(), e))?;
    {
        let submission = handle.lock().await;
        let queue = work_queue_for(&submission)?;
        queue.push_items(&items).await?;
    }

    // Step 8: create the orchestrator job.
    let (cmd, img, parallelism, env_vars, resources) = {
        let submission = handle.lock().await;
        (
            submission.payload.cmd.clone(),
            submission.payload.img.clone(),
            submission.payload.init_size,
            submission.payload.env_vars.clone(),
            submission.payload.k8s_resources_control.clone(),
        )
    };
    let built = job::new(&app_id, &cmd, &img, parallelism, &env_vars, resources.as_ref())?;
    job::create(&built).await.map_err(|e| provisioning(app_id.as_str(), e))?;

    // Step 9: record starting_time and transition to ongoing.
    {
        let mut submission = handle.lock().await;
        submission.starting_time = Some(Utc::now());
        submission.status = SubmissionStatus::Ongoing;
    }
    crate::registry::persist(&*handle.lock().await).await?;

    // Step 10: start the monitor and controller sidecars.
    let monitor_info = handle.lock().await.payload.monitor_info.clone();
    clients
        .monitor
        .start(&app_id, &monitor_info, MONITOR_COLLECT_PERIOD_SECONDS)
        .await
        .map_err(|e| transient(app_id.as_str(), "monitor", e))?;
    let control_parameters = handle.lock().await.payload.control_parameters.clone();
    clients
        .controller
        .start(&app_id, &control_parameters, MONITOR_COLLECT_PERIOD_SECONDS)
        .await
        .map_err(|e| transient(app_id.as_str(), "controller", e))?;

    // Step 11: wait_job_finish.
    let check_interval = config::get().check_interval_seconds;
    loop {
        let (job_completed, terminated) = {
            let submission = handle.lock().await;
            (submission.job_completed, submission.terminated)
        };
        if job_completed || terminated {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_secs(check_interval)).await;
        synchronize(handle).await;
    }

    // Step 12: fetch the final report, record finish_time, hand off to the
    // Cleanup Scheduler.
    let report = clients.monitor.report(&app_id).await.ok();
    let lifetime = {
        let mut submission = handle.lock().await;
        submission.report = report;
        if submission.finish_time.is_none() {
            submission.finish_time = Some(Utc::now());
        }
        submission.authorize_delete();
        submission.job_resources_lifetime
    };
    crate::registry::persist(&*handle.lock().await).await?;
    crate::cleanup::insert(app_id, lifetime as i64).await;

    Ok(())
}

async fn fetch_workload(url: &str) -> Result<Vec<String>> {
    let body = reqwest::get(url)
        .await
        .map_err(|source| WorkloadFetchError {
            url: url.to_string(),
            source,
        })?
        .text()
        .await
        .map_err(|source| WorkloadFetchError {
            url: url.to_string(),
            source,
        })?;
    Ok(body.lines().map(|line| line.to_string()).filter(|line| !line.is_empty()).collect())
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to fetch the workload item list from '{url}'")]
#[code(Status::InternalServerError)]
struct WorkloadFetchError {
    url: String,
    #[source]
    source: reqwest::Error,
}

/// Reads current job status from the orchestrator and applies spec's
/// `synchronize()` rules. Logged, not propagated: this is called both from
/// `wait_job_finish`'s poll loop and from rehydrate's reconciliation pass,
/// neither of which has anywhere useful to bubble an error to.
pub async fn synchronize(handle: &Arc<Mutex<Submission>>) {
    let app_id = handle.lock().await.app_id.clone();
    match job::get(&app_id).await {
        Ok(current) => {
            let mut submission = handle.lock().await;
            if current.active_count() > 0 {
                if submission.status != SubmissionStatus::Ongoing {
                    submission.status = SubmissionStatus::Ongoing;
                }
            } else if current.is_complete() {
                if submission.status == SubmissionStatus::Stopped {
                    submission.terminated = true;
                } else {
                    submission.set_terminal(SubmissionStatus::Completed, true, false);
                }
            } else {
                let reason = current.failure_reason();
                if !current.is_failed() {
                    warn!(
                        "submission {} job is neither active, complete, nor reporting a Failed condition; marking failed",
                        app_id
                    );
                }
                submission.set_terminal(SubmissionStatus::Failed, false, true);
                submission.record_failure(reason);
            }
            drop(submission);
            if let Err(err) = crate::registry::persist(&*handle.lock().await).await {
                warn!("failed to persist synchronize() result for {}: {}", app_id, err);
            }
        }
        Err(err) => {
            warn!("synchronize() failed to reach the orchestrator for {}: {}", app_id, err);
            let mut submission = handle.lock().await;
            if submission.status.is_terminal() {
                submission.terminated = true;
            } else {
                submission.set_terminal(SubmissionStatus::NotFound, false, true);
            }
            drop(submission);
            if let Err(err) = crate::registry::persist(&*handle.lock().await).await {
                warn!("failed to persist synchronize() result for {}: {}", app_id, err);
            }
        }
    }
}

/// Soft finish: drains the work queue but leaves the job running until it
/// empties on its own.
pub async fn stop_application(handle: &Arc<Mutex<Submission>>) -> Result<()> {
    let app_id = handle.lock().await.app_id.clone();
    {
        let submission = handle.lock().await;
        let queue = work_queue_for(&submission)?;
        queue.clear_job_list().await?;
        queue.push_stop_signal().await?;
    }
    let mut submission = handle.lock().await;
    submission.set_terminal(SubmissionStatus::Stopped, false, true);
    submission.authorize_delete();
    drop(submission);
    crate::registry::persist(&*handle.lock().await).await?;
    info!("submission {} stopped", app_id);
    Ok(())
}

/// Hard finish: cascade-deletes the job immediately.
pub async fn terminate_job(handle: &Arc<Mutex<Submission>>) -> Result<()> {
    let app_id = handle.lock().await.app_id.clone();
    job::delete(&app_id).await?;
    let mut submission = handle.lock().await;
    submission.set_terminal(SubmissionStatus::Terminated, false, true);
    submission.authorize_delete();
    drop(submission);
    crate::registry::persist(&*handle.lock().await).await?;
    info!("submission {} terminated", app_id);
    Ok(())
}

/// The submission's accumulated error list, empty if its work queue is
/// unreachable.
pub async fn errors(handle: &Arc<Mutex<Submission>>) -> Vec<String> {
    let submission = handle.lock().await;
    match work_queue_for(&submission) {
        Ok(queue) => queue.errors().await,
        Err(_) => Vec::new(),
    }
}

/// Stops the three sidecars, marks the visualizer URL dead, cascade-deletes
/// the job unless it was already `terminated`, and clears
/// `delete_authorized` once that delete actually succeeds (or wasn't
/// needed). Idempotent: a second call on an already torn-down submission is
/// a logged no-op; a second call after a failed delete retries it.
pub async fn delete_job_resources(handle: &Arc<Mutex<Submission>>) {
    let (app_id, already_deleted, status) = {
        let submission = handle.lock().await;
        (submission.app_id.clone(), !submission.delete_authorized, submission.status)
    };
    if already_deleted {
        info!("submission {} already deleted", app_id);
        return;
    }

    let clients = sidecars();
    clients.monitor.stop(&app_id).await;
    clients.controller.stop(&app_id).await;
    clients.visualizer.stop(&app_id).await;

    {
        let mut submission = handle.lock().await;
        submission.visualizer_url = None;
    }

    // A `Terminated` submission already had its job cascade-deleted by `terminate_job`;
    // anything else still needs the delete attempted here.
    let delete_succeeded = if status != SubmissionStatus::Terminated {
        match job::delete(&app_id).await {
            Ok(_) => true,
            Err(err) => {
                warn!("failed to cascade-delete job for {}: {}", app_id, err);
                false
            }
        }
    } else {
        true
    };

    let mut submission = handle.lock().await;
    // Only clear `delete_authorized` once teardown actually happened — leaving it set
    // on a failed delete lets the next rehydrate pass, cleanup tick, or operator retry
    // the cascade-delete instead of treating the submission as already torn down.
    if delete_succeeded {
        submission.mark_deleted();
    }
    drop(submission);
    if let Err(err) = crate::registry::persist(&*handle.lock().await).await {
        warn!("failed to persist teardown state for {}: {}", app_id, err);
    }
    if delete_succeeded {
        info!("resources torn down for submission {}", app_id);
    } else {
        info!("submission {} teardown incomplete, will retry", app_id);
    }
}
