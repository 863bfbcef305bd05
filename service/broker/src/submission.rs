//! The value type persisted for every submission, and the payload shape
//! accepted on admission. Replaces the deep pickling of a live executor
//! instance with an explicit record (see spec's data model) plus a pure
//! serialize/deserialize pair; executor behavior is rebound to this value
//! at rehydrate time rather than thawed out of a blob.

use chrono::{DateTime, Utc};
use error::*;
use error::Status as HttpStatus;
use kind::Kind;
use result::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("submission payload is missing or has the wrong type for field '{field}'")]
#[code(HttpStatus::BadRequest)]
pub struct InvalidPayload {
    pub field: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to deserialize a persisted submission record")]
#[code(HttpStatus::InternalServerError)]
pub struct CorruptRecord {
    #[source]
    source: serde_json::Error,
}

/// The request body accepted by `POST /submissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub cmd: Vec<String>,
    pub control_parameters: Value,
    pub control_plugin: String,
    pub env_vars: HashMap<String, String>,
    pub img: String,
    pub init_size: i32,
    pub monitor_info: Value,
    pub monitor_plugin: String,
    pub redis_workload: String,
    pub manager_plugin: String,
    pub enable_visualizer: bool,
    #[serde(default)]
    pub visualizer_plugin: Option<String>,
    #[serde(default)]
    pub visualizer_info: Option<Value>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub job_resources_lifetime: Option<u64>,
    #[serde(default)]
    pub k8s_resources_control: Option<Value>,
    #[serde(default)]
    pub enable_auth: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub config_id: Option<String>,
}

impl SubmissionPayload {
    /// Validates the required fields declared in the submission protocol.
    /// `serde`'s own deserialization already enforces field presence/types for
    /// required fields; this additionally enforces the cross-field rule that
    /// `enable_visualizer = true` requires `visualizer_plugin`/`visualizer_info`.
    pub fn validate(&self) -> Result<()> {
        if self.init_size <= 0 {
            return Err(InvalidPayload {
                field: "init_size".to_string(),
            }
            .into());
        }
        if self.enable_visualizer && (self.visualizer_plugin.is_none() || self.visualizer_info.is_none()) {
            return Err(InvalidPayload {
                field: "visualizer_plugin/visualizer_info".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Kind)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Created,
    Ongoing,
    Completed,
    Failed,
    Terminated,
    Stopped,
    Error,
    NotFound,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Completed
                | Status::Failed
                | Status::Terminated
                | Status::Stopped
                | Status::Error
                | Status::NotFound
        )
    }
}

/// The durable record for one submission. Exactly one of `job_completed`/
/// `terminated` may be true at teardown time; both are false while ongoing.
#[derive(Debug, Clone, Serialize, Deserialize, Kind)]
pub struct Submission {
    pub app_id: String,
    pub payload: SubmissionPayload,
    pub status: Status,
    pub starting_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub queue_ip: Option<String>,
    pub queue_port: Option<u16>,
    pub visualizer_url: Option<String>,
    pub report: Option<Value>,
    pub job_resources_lifetime: u64,
    pub delete_authorized: bool,
    pub job_completed: bool,
    pub terminated: bool,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Submission {
    pub fn new(app_id: String, payload: SubmissionPayload) -> Self {
        let job_resources_lifetime = payload.job_resources_lifetime.unwrap_or(0);
        Submission {
            app_id,
            payload,
            status: Status::Created,
            starting_time: None,
            finish_time: None,
            queue_ip: None,
            queue_port: None,
            visualizer_url: None,
            report: None,
            job_resources_lifetime,
            delete_authorized: false,
            job_completed: false,
            terminated: false,
            failure_reason: None,
        }
    }

    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self).map_err(|source| CorruptRecord { source })?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(blob).map_err(|source| CorruptRecord { source })?)
    }

    /// Transitions to a terminal state, recording `finish_time` the first time this is
    /// called. Panics in debug builds if the caller asks for both `job_completed` and
    /// `terminated`, which spec's data model forbids (only one describes how a
    /// submission stopped running).
    pub fn set_terminal(&mut self, status: Status, job_completed: bool, terminated: bool) -> &mut Self {
        debug_assert!(
            !(job_completed && terminated),
            "a submission cannot be both job_completed and terminated"
        );
        self.status = status;
        self.job_completed = job_completed;
        self.terminated = terminated;
        if self.finish_time.is_none() {
            self.finish_time = Some(Utc::now());
        }
        self
    }

    /// Authorizes resource teardown: `delete_job_resources` will act on the next call
    /// instead of treating this submission as already torn down.
    pub fn authorize_delete(&mut self) -> &mut Self {
        self.delete_authorized = true;
        self
    }

    /// Clears the teardown flag. Callers must only call this once teardown has
    /// actually completed (or was never needed) — clearing it after a failed
    /// teardown attempt would make the failure unretriable.
    pub fn mark_deleted(&mut self) -> &mut Self {
        self.delete_authorized = false;
        self
    }

    /// Records why a job's terminal state was reached, surfaced alongside `status`.
    pub fn record_failure(&mut self, reason: Option<String>) -> &mut Self {
        self.failure_reason = reason;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            cmd: vec!["python".to_string(), "run.py".to_string()],
            control_parameters: Value::Null,
            control_plugin: "default".to_string(),
            env_vars: HashMap::new(),
            img: "repo/image:latest".to_string(),
            init_size: 1,
            monitor_info: Value::Null,
            monitor_plugin: "default".to_string(),
            redis_workload: "http://example.com/workload.txt".to_string(),
            manager_plugin: "kubejobs".to_string(),
            enable_visualizer: false,
            visualizer_plugin: None,
            visualizer_info: None,
            cluster_name: None,
            job_resources_lifetime: None,
            k8s_resources_control: None,
            enable_auth: None,
            username: None,
            password: None,
            config_id: None,
        }
    }

    #[test]
    fn mark_deleted_clears_delete_authorized() {
        let mut sub = Submission::new("kj-abc1234".to_string(), payload());
        sub.authorize_delete();
        assert!(sub.delete_authorized);
        sub.mark_deleted();
        assert!(!sub.delete_authorized);
    }

    #[test]
    fn set_terminal_records_finish_time_once() {
        let mut sub = Submission::new("kj-abc1234".to_string(), payload());
        sub.set_terminal(Status::Failed, false, true);
        let first = sub.finish_time;
        assert!(first.is_some());
        assert!(sub.terminated);
        assert!(!sub.job_completed);
        sub.set_terminal(Status::Failed, false, true);
        assert_eq!(sub.finish_time, first);
    }

    #[test]
    fn new_submission_defaults_to_created_and_zero_lifetime() {
        let sub = Submission::new("kj-abc1234".to_string(), payload());
        assert_eq!(sub.status, Status::Created);
        assert_eq!(sub.job_resources_lifetime, 0);
        assert!(!sub.job_completed);
        assert!(!sub.terminated);
    }

    #[test]
    fn blob_roundtrips() {
        let mut sub = Submission::new("kj-abc1234".to_string(), payload());
        sub.status = Status::Ongoing;
        sub.queue_ip = Some("10.0.0.5".to_string());
        sub.queue_port = Some(6379);
        let blob = sub.to_blob().unwrap();
        let restored = Submission::from_blob(&blob).unwrap();
        assert_eq!(restored.app_id, sub.app_id);
        assert_eq!(restored.status, sub.status);
        assert_eq!(restored.queue_ip, sub.queue_ip);
    }

    #[test]
    fn rejects_nonpositive_init_size() {
        let mut p = payload();
        p.init_size = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_visualizer_enabled_without_info() {
        let mut p = payload();
        p.enable_visualizer = true;
        assert!(p.validate().is_err());
    }
}
