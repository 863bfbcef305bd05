//! The Admission Front-End: the single entry point a submission passes
//! through before a driver task ever touches it. Shallow by design —
//! authenticate, validate, resolve plugins, hand off — everything else is
//! the Submission Executor's problem.

use crate::config;
use crate::errors::Unauthorized;
use crate::plugins::{self, Component};
use crate::registry;
use crate::submission::{Submission, SubmissionPayload};
use error::*;
use result::Result;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Default)]
struct AuthResponse {
    #[serde(default)]
    authenticated: bool,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to reach the authentication service")]
#[code(Status::InternalServerError)]
struct AuthServiceUnreachable {
    #[source]
    source: reqwest::Error,
}

async fn authenticate(payload: &SubmissionPayload) -> Result<()> {
    if !payload.enable_auth.unwrap_or(false) {
        return Ok(());
    }
    let username = payload.username.as_deref().unwrap_or("");
    let password = payload.password.as_deref().unwrap_or("");
    let url = format!("{}/authenticate", config::get().auth_base);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&Credentials { username, password })
        .send()
        .await
        .map_err(|source| AuthServiceUnreachable { source })?;
    let ok = response.status().is_success()
        && response
            .json::<AuthResponse>()
            .await
            .unwrap_or_default()
            .authenticated;
    if !ok {
        return Err(Unauthorized {
            app_id: String::new(),
        }
        .into());
    }
    Ok(())
}

/// Resolves every plugin the payload declares and rewrites the
/// corresponding field to the resolved module identifier, failing with
/// `bad_request` (via `UnknownPlugin`) on the first one that doesn't exist.
async fn resolve_plugins(payload: &mut SubmissionPayload) -> Result<()> {
    payload.manager_plugin = plugins::resolve(&payload.manager_plugin, Component::Manager).await?;
    payload.control_plugin = plugins::resolve(&payload.control_plugin, Component::Controller).await?;
    payload.monitor_plugin = plugins::resolve(&payload.monitor_plugin, Component::Monitor).await?;
    if let Some(visualizer_plugin) = payload.visualizer_plugin.as_ref() {
        let resolved = plugins::resolve(visualizer_plugin, Component::Visualizer).await?;
        payload.visualizer_plugin = Some(resolved);
    }
    Ok(())
}

/// Admits a submission: authenticates, validates, resolves plugins,
/// allocates an `app_id`, persists the initial record, and spawns the
/// driver task that carries it through `start_application`. Returns the
/// `app_id` the caller polls with.
pub async fn execute(mut payload: SubmissionPayload) -> Result<String> {
    payload.validate()?;
    authenticate(&payload).await?;
    resolve_plugins(&mut payload).await?;

    let app_id = format!("kj-{}", &names::uuid()[..8]);
    let submission = Submission::new(app_id.clone(), payload);
    registry::insert(submission).await?;
    tokio::spawn(crate::executor::run(app_id.clone()));
    Ok(app_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            cmd: vec!["true".to_string()],
            control_parameters: Value::Null,
            control_plugin: "default".to_string(),
            env_vars: HashMap::new(),
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
    async fn resolve_plugins_rewrites_known_names() {
        plugins::seed(&[]).await;
        let mut p = payload();
        resolve_plugins(&mut p).await.unwrap();
        assert_eq!(p.manager_plugin, "chronos.plugins.kubejobs");
        assert_eq!(p.control_plugin, "chronos.plugins.controller.default");
        assert_eq!(p.monitor_plugin, "chronos.plugins.monitor.default");
    }

    #[tokio::test]
    async fn resolve_plugins_rejects_unknown_names() {
        plugins::seed(&[]).await;
        let mut p = payload();
        p.control_plugin = "does-not-exist".to_string();
        assert!(resolve_plugins(&mut p).await.is_err());
    }

    #[tokio::test]
    async fn resolve_plugins_rejects_unknown_manager_plugin() {
        plugins::seed(&[]).await;
        let mut p = payload();
        p.manager_plugin = "does-not-exist".to_string();
        assert!(resolve_plugins(&mut p).await.is_err());
    }

    #[tokio::test]
    async fn unauthenticated_submissions_skip_the_auth_service() {
        let p = payload();
        assert!(authenticate(&p).await.is_ok());
    }
}
