//! The HTTP surface: thin Rocket handlers that validate nothing beyond what
//! `rocket::serde::json::Json` gives for free and otherwise delegate
//! straight to `admission`, `registry`, `executor`, `cluster`, and
//! `plugins`. Every handler returns `result::Result<_>`, so a
//! `Box<dyn ChronosError>` becomes the standard `{"payload": null,
//! "error": {...}}` envelope automatically.

use crate::cluster::{self, ClusterProfile};
use crate::errors::BadRequest;
use crate::executor;
use crate::plugins::{self, Component, PluginRecord};
use crate::registry;
use crate::submission::{Submission, SubmissionPayload};
use error::*;
use orchestrator::job;
use response::Response;
use result::Result;
use rocket::http::Status as HttpStatus;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize, Kind)]
pub struct SubmissionAccepted {
    pub job_id: String,
}

#[derive(Serialize, Kind)]
pub struct SubmissionList(pub HashMap<String, Submission>);

#[derive(Serialize, Kind)]
pub struct ErrorList(pub Vec<String>);

#[derive(Serialize, Kind)]
pub struct VisualizerUrl {
    pub visualizer_url: Option<String>,
}

#[derive(Serialize, Kind)]
pub struct SubmissionLog {
    pub execution: String,
    pub stderr: String,
    pub stdout: String,
}

#[derive(Serialize, Kind)]
pub struct PublicKey {
    pub key: String,
}

#[derive(Serialize, Kind)]
pub struct ClusterProfileList(pub Vec<ClusterProfile>);

#[derive(Serialize, Kind)]
pub struct PluginList(pub Vec<PluginRecord>);

fn accepted<T: Serialize + Kind>(payload: T) -> Custom<Response<T>> {
    Custom(HttpStatus::Accepted, payload.into())
}

fn no_content() -> Custom<Response<()>> {
    Custom(HttpStatus::NoContent, ().into())
}

/// `POST /v1/submissions`
#[post("/submissions", data = "<payload>")]
pub async fn submit(payload: Json<SubmissionPayload>) -> Result<Custom<Response<SubmissionAccepted>>> {
    let job_id = crate::admission::execute(payload.into_inner()).await?;
    Ok(accepted(SubmissionAccepted { job_id }))
}

/// `PUT /v1/submissions/<id>/stop`
#[put("/submissions/<id>/stop")]
pub async fn stop(id: String) -> Result<Custom<Response<()>>> {
    let handle = registry::get_or_not_found(&id).await?;
    executor::stop_application(&handle).await?;
    Ok(no_content())
}

/// `PUT /v1/submissions/<id>/terminate`
#[put("/submissions/<id>/terminate")]
pub async fn terminate(id: String) -> Result<Custom<Response<()>>> {
    let handle = registry::get_or_not_found(&id).await?;
    executor::terminate_job(&handle).await?;
    Ok(no_content())
}

/// `GET /v1/submissions`
#[get("/submissions")]
pub async fn list_submissions() -> Result<Response<SubmissionList>> {
    Ok(SubmissionList(registry::snapshot().await).into())
}

/// `GET /v1/submissions/<id>`
#[get("/submissions/<id>")]
pub async fn get_submission(id: String) -> Result<Response<Submission>> {
    let handle = registry::get_or_not_found(&id).await?;
    Ok(handle.lock().await.clone().into())
}

#[derive(Serialize, Kind)]
pub struct SubmissionReport(pub serde_json::Value);

/// `GET /v1/submissions/<id>/report`
#[get("/submissions/<id>/report")]
pub async fn report(id: String) -> Result<Response<SubmissionReport>> {
    let handle = registry::get_or_not_found(&id).await?;
    let report = handle.lock().await.report.clone().unwrap_or(serde_json::Value::Null);
    Ok(SubmissionReport(report).into())
}

/// `GET /v1/submissions/<id>/errors`
#[get("/submissions/<id>/errors")]
pub async fn errors(id: String) -> Result<Response<ErrorList>> {
    let handle = registry::get_or_not_found(&id).await?;
    Ok(ErrorList(executor::errors(&handle).await).into())
}

/// `GET /v1/submissions/<id>/log`
#[get("/submissions/<id>/log")]
pub async fn log(id: String) -> Result<Response<SubmissionLog>> {
    registry::get_or_not_found(&id).await?;
    let execution = job::logs(&id).await.unwrap_or_default();
    Ok(SubmissionLog {
        execution: execution.clone(),
        stderr: execution.clone(),
        stdout: execution,
    }
    .into())
}

/// `GET /v1/submissions/<id>/visualizer`
#[get("/submissions/<id>/visualizer")]
pub async fn visualizer(id: String) -> Result<Response<VisualizerUrl>> {
    let handle = registry::get_or_not_found(&id).await?;
    let visualizer_url = handle.lock().await.visualizer_url.clone();
    Ok(VisualizerUrl { visualizer_url }.into())
}

/// `DELETE /v1/submissions/<id>`
#[delete("/submissions/<id>")]
pub async fn delete_submission(id: String) -> Result<Response<()>> {
    registry::delete(&id).await?;
    Ok(().into())
}

/// `DELETE /v1/submissions` — deletes every submission in a terminal state.
#[delete("/submissions")]
pub async fn delete_all_terminal() -> Result<Response<()>> {
    registry::delete_all_terminal().await?;
    Ok(().into())
}

#[derive(serde::Deserialize)]
pub struct ClusterProfileUpload {
    pub name: String,
    pub config_blob: String,
}

/// `POST /v1/submissions/cluster`
#[post("/submissions/cluster", data = "<upload>")]
pub async fn add_cluster(upload: Json<ClusterProfileUpload>) -> Result<Custom<Response<()>>> {
    let upload = upload.into_inner();
    cluster::add(upload.name, upload.config_blob.into_bytes()).await?;
    Ok(accepted(()))
}

#[derive(serde::Deserialize)]
pub struct CertificateUpload {
    pub name: String,
    pub blob: String,
}

/// `POST /v1/submissions/cluster/<name>/certificate`
#[post("/submissions/cluster/<name>/certificate", data = "<upload>")]
pub async fn add_certificate(name: String, upload: Json<CertificateUpload>) -> Result<Custom<Response<()>>> {
    let upload = upload.into_inner();
    cluster::add_certificate(&name, upload.name, upload.blob.into_bytes()).await?;
    Ok(accepted(()))
}

/// `DELETE /v1/submissions/cluster/<name>/certificate/<cert>`
#[delete("/submissions/cluster/<name>/certificate/<cert_name>")]
pub async fn delete_certificate(name: String, cert_name: String) -> Result<Custom<Response<()>>> {
    cluster::delete_certificate(&name, &cert_name).await?;
    Ok(accepted(()))
}

/// `DELETE /v1/submissions/cluster/<name>`
#[delete("/submissions/cluster/<name>")]
pub async fn delete_cluster(name: String) -> Result<Custom<Response<()>>> {
    cluster::delete(&name).await?;
    Ok(accepted(()))
}

/// `PUT /v1/submissions/cluster/<name>/activate`
#[put("/submissions/cluster/<name>/activate")]
pub async fn activate_cluster(name: String) -> Result<Response<()>> {
    cluster::activate(&name).await?;
    Ok(().into())
}

/// `GET /v1/submissions/cluster`
#[get("/submissions/cluster")]
pub async fn list_clusters() -> Result<Response<ClusterProfileList>> {
    Ok(ClusterProfileList(cluster::list().await).into())
}

/// `GET /v1/submissions/cluster/activate`
#[get("/submissions/cluster/activate")]
pub async fn active_cluster() -> Result<Response<ClusterProfile>> {
    cluster::active()
        .await
        .map(Into::into)
        .ok_or_else(|| {
            BadRequest {
                message: "no cluster profile is currently active".to_string(),
            }
            .into()
        })
}

/// `GET /healthz`
#[get("/healthz")]
pub fn healthz() -> &'static str {
    "OK"
}

#[derive(serde::Deserialize)]
pub struct PluginInstall {
    pub name: String,
    pub component: Component,
    pub install_source: String,
    pub module: String,
}

/// `POST /v1/plugins`
#[post("/plugins", data = "<install>")]
pub async fn install_plugin(install: Json<PluginInstall>) -> Result<Response<PluginRecord>> {
    let install = install.into_inner();
    let record = PluginRecord {
        name: install.name,
        component: install.component,
        install_source: install.install_source,
        module: install.module,
    };
    plugins::install(record.clone()).await;
    Ok(record.into())
}

/// `GET /v1/plugins`
#[get("/plugins")]
pub async fn list_plugins() -> Result<Response<PluginList>> {
    Ok(PluginList(plugins::list().await).into())
}

/// `GET /key` — the broker host's public SSH key.
#[get("/key")]
pub async fn key() -> Result<Response<PublicKey>> {
    let path = crate::config::get().ssh_key_path;
    let key = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| KeyReadError { path, source })?;
    Ok(PublicKey { key: key.trim().to_string() }.into())
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to read the broker's public key from '{path}'")]
#[code(Status::InternalServerError)]
struct KeyReadError {
    path: String,
    #[source]
    source: std::io::Error,
}

/// Everything versioned under `/v1`.
pub fn api_routes() -> Vec<rocket::Route> {
    routes![
        submit,
        stop,
        terminate,
        list_submissions,
        get_submission,
        report,
        errors,
        log,
        visualizer,
        delete_submission,
        delete_all_terminal,
        add_cluster,
        add_certificate,
        delete_certificate,
        delete_cluster,
        activate_cluster,
        list_clusters,
        active_cluster,
        install_plugin,
        list_plugins,
    ]
}

/// Unversioned operational endpoints: infrastructure probes hit these
/// directly without caring which API version the broker is serving.
pub fn ops_routes() -> Vec<rocket::Route> {
    routes![healthz, key]
}
