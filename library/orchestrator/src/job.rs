use error::*;
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams, PostParams};
use kube::Api;
use result::Result;
use serde_json::Value;

/// Builds a parallel `batch/v1` Job object for a submission. `parallelism` maps directly onto
/// both `.spec.parallelism` and `.spec.completions`: every work item pulled by the job's workers
/// is expected to come from the submission's own work queue, not from the Job's completion count,
/// so completions simply mirrors parallelism to let Kubernetes consider the Job done once that
/// many pods have succeeded.
pub fn new<N: AsRef<str>>(
    app_id: N,
    cmd: &[String],
    image: &str,
    parallelism: i32,
    env_vars: &std::collections::HashMap<String, String>,
    resources: Option<&Value>,
) -> Result<Job> {
    let app_id = app_id.as_ref();
    let env: Vec<Value> = env_vars
        .iter()
        .map(|(name, value)| serde_json::json!({"name": name, "value": value}))
        .collect();
    let mut container = serde_json::json!({
        "name": app_id,
        "image": image,
        "command": cmd,
        "env": env,
        "imagePullPolicy": "IfNotPresent",
    });
    if let Some(resources) = resources {
        container["resources"] = resources.clone();
    }
    let job: Job = serde_json::from_value(serde_json::json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": app_id,
            "namespace": super::SUBMISSIONS_NAMESPACE,
        },
        "spec": {
            "parallelism": parallelism,
            "completions": parallelism,
            "template": {
                "metadata": {
                    "labels": {"app_id": app_id},
                },
                "spec": {
                    "containers": [container],
                    "restartPolicy": "Never",
                }
            }
        }
    }))
    .map_err(|source| JobSerializationError {
        app_id: app_id.to_string(),
        image: image.to_string(),
        source,
    })?;
    Ok(job)
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error(
    "Failed to serialize a Kubernetes job resource for submission '{app_id}' with image \
    reference '{image}'. This is an internal error; retrying is unlikely to help."
)]
#[code(Status::InternalServerError)]
pub struct JobSerializationError {
    app_id: String,
    image: String,
    #[source]
    source: serde_json::Error,
}

/// Creates the given job in the submissions namespace.
pub async fn create(job: &Job) -> Result<Job> {
    let client: Api<Job> = super::client::new().await;
    Ok(client
        .create(&PostParams::default(), job)
        .await
        .map_err(super::errors::ApiError::from)?)
}

/// Fetches the current state of a submission's job.
pub async fn get<N: AsRef<str>>(app_id: N) -> Result<Job> {
    let client: Api<Job> = super::client::new().await;
    Ok(client
        .get(app_id.as_ref())
        .await
        .map_err(super::errors::ApiError::from)?)
}

/// Cascade-deletes a submission's job. Idempotent: a missing job is not an error.
pub async fn delete<N: AsRef<str>>(app_id: N) -> Result<()> {
    super::delete::<Job, _>(app_id).await?;
    Ok(())
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("no pod was found for submission '{app_id}''s job")]
#[code(Status::NotFound)]
pub struct NoPodForJob {
    app_id: String,
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("failed to fetch container logs for submission '{app_id}'")]
#[code(Status::InternalServerError)]
pub struct LogFetchError {
    app_id: String,
    #[source]
    source: kube::Error,
}

/// Fetches the full (non-streaming) container log for a submission's job pod. Kubernetes
/// interleaves stdout and stderr into a single stream, so this is the closest a container
/// log API gets to the original's separate execution/stdout/stderr capture files.
pub async fn logs<N: AsRef<str>>(app_id: N) -> Result<String> {
    let app_id = app_id.as_ref();
    let pods: Api<Pod> = super::client::new().await;
    let selector = format!("app_id={}", app_id);
    let list = pods
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(super::errors::ApiError::from)?;
    let pod = list.items.into_iter().next().ok_or_else(|| NoPodForJob {
        app_id: app_id.to_string(),
    })?;
    let name = pod.metadata.name.unwrap_or_default();
    pods.logs(&name, &LogParams::default())
        .await
        .map_err(|source| {
            LogFetchError {
                app_id: app_id.to_string(),
                source,
            }
            .into()
        })
}

/// JobExt answers common questions about the state of a submission's job.
pub trait JobExt {
    fn active_count(&self) -> i32;
    fn is_complete(&self) -> bool;
    fn is_failed(&self) -> bool;
    fn failure_reason(&self) -> Option<String>;
}

impl JobExt for Job {
    fn active_count(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s: &JobStatus| s.active)
            .unwrap_or(0)
    }

    fn is_complete(&self) -> bool {
        condition(self, "Complete")
    }

    fn is_failed(&self) -> bool {
        condition(self, "Failed")
    }

    fn failure_reason(&self) -> Option<String> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conditions| {
                conditions
                    .iter()
                    .find(|c| c.type_ == "Failed" && c.status == "True")
            })
            .and_then(|c| c.reason.clone())
    }
}

fn condition(job: &Job, kind: &str) -> bool {
    let default: Vec<JobCondition> = Vec::new();
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .unwrap_or(&default)
        .iter()
        .any(|c| c.type_ == kind && c.status == "True")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_parallel_job() {
        let env = std::collections::HashMap::new();
        let job = new("kj-abc1234", &["python".to_string(), "run.py".to_string()], "repo/image:latest", 3, &env, None)
            .unwrap();
        assert_eq!(job.metadata.name.as_deref(), Some("kj-abc1234"));
        assert_eq!(job.spec.unwrap().parallelism, Some(3));
    }
}
