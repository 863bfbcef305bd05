//! The Submission Registry: a concurrent `app_id -> Submission` map backed by
//! one of the two `persistence::SubmissionStore` implementations, following
//! the same lock-per-singleton, lazy_static-backed shape as the teacher's
//! `podmanager::POD_MANAGER_CACHE`.

use crate::errors::SubmissionNotFound;
use crate::executor;
use crate::submission::{Status, Submission};
use chrono::Utc;
use error::*;
use lazy_static::lazy_static;
use log::{info, warn};
use persistence::SubmissionStore;
use result::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

lazy_static! {
    static ref SUBMISSIONS: RwLock<HashMap<String, Arc<Mutex<Submission>>>> = RwLock::new(HashMap::new());
    static ref STORE: RwLock<Option<Arc<dyn SubmissionStore>>> = RwLock::new(None);
}

pub async fn init(store: Arc<dyn SubmissionStore>) {
    *STORE.write().await = Some(store);
    SUBMISSIONS.write().await.clear();
}

async fn store() -> Arc<dyn SubmissionStore> {
    STORE
        .read()
        .await
        .clone()
        .expect("registry::init() must run before any other registry operation")
}

pub async fn persist(submission: &Submission) -> Result<()> {
    store().await.put(&submission.app_id, submission.to_blob()?).await
}

/// Inserts a freshly created submission: persists it, then makes it visible
/// in the in-memory map. Returns the shared handle the caller (admission)
/// hands off to a spawned driver task.
pub async fn insert(submission: Submission) -> Result<Arc<Mutex<Submission>>> {
    persist(&submission).await?;
    let app_id = submission.app_id.clone();
    let handle = Arc::new(Mutex::new(submission));
    SUBMISSIONS.write().await.insert(app_id, handle.clone());
    Ok(handle)
}

pub async fn get(app_id: &str) -> Option<Arc<Mutex<Submission>>> {
    SUBMISSIONS.read().await.get(app_id).cloned()
}

pub async fn get_or_not_found(app_id: &str) -> Result<Arc<Mutex<Submission>>> {
    get(app_id).await.ok_or_else(|| {
        SubmissionNotFound {
            app_id: app_id.to_string(),
        }
        .into()
    })
}

/// A point-in-time snapshot of every submission, for `GET /submissions`.
pub async fn snapshot() -> HashMap<String, Submission> {
    let mut out = HashMap::new();
    for (app_id, handle) in SUBMISSIONS.read().await.iter() {
        out.insert(app_id.clone(), handle.lock().await.clone());
    }
    out
}

/// Tears down a submission's cluster/sidecar resources without forgetting
/// its record. This is what the Cleanup Scheduler's tick calls, and what
/// `DELETE /submissions/{id}` calls before forgetting the record.
pub async fn delete_job_resources(app_id: &str) {
    let handle = match get(app_id).await {
        Some(handle) => handle,
        None => {
            warn!("cleanup fired for unknown submission {}", app_id);
            return;
        }
    };
    executor::delete_job_resources(&handle).await;
}

/// Fully removes a submission's record: tears down its resources, deletes
/// its persisted blob, and forgets it from the in-memory map.
pub async fn delete(app_id: &str) -> Result<()> {
    delete_job_resources(app_id).await;
    store().await.delete(app_id).await?;
    SUBMISSIONS.write().await.remove(app_id);
    Ok(())
}

/// Deletes every submission currently in a terminal state.
pub async fn delete_all_terminal() -> Result<()> {
    let terminal: Vec<String> = {
        let mut ids = Vec::new();
        for (app_id, handle) in SUBMISSIONS.read().await.iter() {
            if handle.lock().await.status.is_terminal() {
                ids.push(app_id.clone());
            }
        }
        ids
    };
    for app_id in terminal {
        delete(&app_id).await?;
    }
    Ok(())
}

/// The ordered startup rehydrate sequence of spec's Submission Registry.
pub async fn rehydrate() -> Result<()> {
    let blobs = store().await.get_all("").await?;
    let mut submissions: Vec<Submission> = Vec::with_capacity(blobs.len());
    for (app_id, blob) in blobs {
        match Submission::from_blob(&blob) {
            Ok(submission) => submissions.push(submission),
            Err(err) => warn!("skipping corrupt submission record '{}': {:?}", app_id, err),
        }
    }

    // Step 2: finalize anything already past its teardown deadline, or
    // requeue the remainder into the Cleanup Scheduler.
    for submission in &submissions {
        if let (Some(finish_time), true) = (submission.finish_time, submission.delete_authorized) {
            let elapsed = (Utc::now() - finish_time).num_seconds().max(0) as u64;
            let handle = Arc::new(Mutex::new(submission.clone()));
            SUBMISSIONS.write().await.insert(submission.app_id.clone(), handle.clone());
            if elapsed >= submission.job_resources_lifetime {
                executor::delete_job_resources(&handle).await;
            } else {
                let remaining = (submission.job_resources_lifetime - elapsed) as i64;
                crate::cleanup::insert(submission.app_id.clone(), remaining).await;
            }
        } else {
            let handle = Arc::new(Mutex::new(submission.clone()));
            SUBMISSIONS.write().await.insert(submission.app_id.clone(), handle);
        }
    }

    // Step 3: anything still mid-flight gets a fresh driver task.
    for submission in &submissions {
        if !submission.job_completed && !submission.terminated {
            info!("rehydrating in-flight submission {}", submission.app_id);
            let app_id = submission.app_id.clone();
            tokio::spawn(executor::run(app_id));
        }
    }

    // Step 4: reconcile every submission against current cluster state.
    for submission in &submissions {
        if let Some(handle) = get(&submission.app_id).await {
            executor::synchronize(&handle).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::SubmissionPayload;
    use serde_json::Value;
    use std::collections::HashMap as Map;

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            cmd: vec!["true".to_string()],
            control_parameters: Value::Null,
            control_plugin: "default".to_string(),
            env_vars: Map::new(),
            img: "busybox".to_string(),
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

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let store = persistence::sqlite::SqliteSubmissionStore::submissions(":memory:")
            .await
            .unwrap();
        init(Arc::new(store)).await;

        let submission = Submission::new("kj-test0001".to_string(), payload());
        insert(submission).await.unwrap();

        let handle = get_or_not_found("kj-test0001").await.unwrap();
        assert_eq!(handle.lock().await.status, Status::Created);
        assert!(get_or_not_found("kj-missing").await.is_err());
    }
}
