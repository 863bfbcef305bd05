//! HTTP clients for the three collaborator sidecars (monitor, controller,
//! visualizer), grounded in `broker/utils/framework/monitor.py` and
//! `visualizer.py`. Each sidecar speaks the same small protocol; `SidecarClient`
//! is parameterized by a base URL and a service name so one type serves all three.

use backoff::backoff::Backoff;
use error::*;
use log::{debug, warn};
use result::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How long the final-report fetch (spec.md §4.1 step 12) is retried for before
/// giving up, using the same exponential-backoff idiom as the orchestrator's
/// readiness polling.
pub const REPORT_RETRY_SECONDS: u64 = 60;

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("request to sidecar '{service}' at '{url}' failed")]
#[code(Status::BadGateway)]
pub struct RequestError {
    service: String,
    url: String,
    #[source]
    source: reqwest::Error,
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error(
    "the '{service}' sidecar at '{url}' kept returning a transient failure status \
    for longer than {seconds}s"
)]
#[code(Status::BadGateway)]
pub struct TooManyFailures {
    service: String,
    url: String,
    seconds: u64,
}

#[derive(Serialize)]
struct StartBody<'a> {
    plugin_info: &'a Value,
    collect_period: u64,
}

#[derive(Deserialize)]
struct VisualizerUrlBody {
    url: String,
}

#[derive(Serialize)]
struct InstallPluginBody<'a> {
    install_source: &'a str,
    plugin_source: &'a str,
}

pub struct SidecarClient {
    client: reqwest::Client,
    base: String,
    service: &'static str,
}

impl SidecarClient {
    pub fn monitor(base: impl Into<String>) -> Self {
        SidecarClient {
            client: reqwest::Client::new(),
            base: base.into(),
            service: "monitor",
        }
    }

    pub fn controller(base: impl Into<String>) -> Self {
        SidecarClient {
            client: reqwest::Client::new(),
            base: base.into(),
            service: "controller",
        }
    }

    pub fn visualizer(base: impl Into<String>) -> Self {
        SidecarClient {
            client: reqwest::Client::new(),
            base: base.into(),
            service: "visualizer",
        }
    }

    /// `POST {base}/{service}/{app_id}`. Starts this sidecar for `app_id`.
    pub async fn start(&self, app_id: &str, plugin_info: &Value, collect_period: u64) -> Result<()> {
        let url = format!("{}/{}/{}", self.base, self.service, app_id);
        self.client
            .post(&url)
            .json(&StartBody {
                plugin_info,
                collect_period,
            })
            .send()
            .await
            .map_err(|source| RequestError {
                service: self.service.to_string(),
                url: url.clone(),
                source,
            })?;
        Ok(())
    }

    /// `PUT {base}/{service}/{app_id}/stop`. Failures here are logged, not fatal;
    /// `delete_job_resources` stops all three sidecars regardless of the others'
    /// outcome.
    pub async fn stop(&self, app_id: &str) {
        let url = format!("{}/{}/{}/stop", self.base, self.service, app_id);
        if let Err(err) = self.client.put(&url).send().await {
            warn!(
                "Failed to stop the '{}' sidecar for {}: {:?}",
                self.service, app_id, err
            );
        }
    }

    /// `GET {base}/{service}/{app_id}`. Visualizer only.
    pub async fn visualizer_url(&self, app_id: &str) -> Result<String> {
        let url = format!("{}/{}/{}", self.base, self.service, app_id);
        let body: VisualizerUrlBody = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| RequestError {
                service: self.service.to_string(),
                url: url.clone(),
                source,
            })?
            .json()
            .await
            .map_err(|source| RequestError {
                service: self.service.to_string(),
                url,
                source,
            })?;
        Ok(body.url)
    }

    /// `GET {base}/monitoring/{app_id}/report`. Monitor only.
    pub async fn report(&self, app_id: &str) -> Result<Value> {
        self.get_report(app_id, "report").await
    }

    /// `GET {base}/monitoring/{app_id}/report/detailed`. Monitor only.
    pub async fn detailed_report(&self, app_id: &str) -> Result<Value> {
        self.get_report(app_id, "report/detailed").await
    }

    async fn get_report(&self, app_id: &str, path: &str) -> Result<Value> {
        let url = format!("{}/monitoring/{}/{}", self.base, app_id, path);
        let mut b = backoff::ExponentialBackoff::default();
        b.max_elapsed_time = Some(std::time::Duration::from_secs(REPORT_RETRY_SECONDS));
        loop {
            let resp = self.client.get(&url).send().await;
            match resp {
                Ok(resp) if resp.status() == 200 || resp.status() == 400 => {
                    return resp.json().await.map_err(|source| {
                        RequestError {
                            service: self.service.to_string(),
                            url: url.clone(),
                            source,
                        }
                        .into()
                    });
                }
                other => {
                    debug!("Transient failure fetching report from {}: {:?}", url, other.err());
                    match b.next_backoff() {
                        None => {
                            return Err(TooManyFailures {
                                service: self.service.to_string(),
                                url,
                                seconds: REPORT_RETRY_SECONDS,
                            }
                            .into())
                        }
                        Some(duration) => tokio::time::sleep(duration).await,
                    }
                }
            }
        }
    }

    /// `POST {base}/plugins`. Installs a plugin on this collaborator.
    pub async fn install_plugin(&self, install_source: &str, plugin_source: &str) -> Result<()> {
        let url = format!("{}/plugins", self.base);
        self.client
            .post(&url)
            .json(&InstallPluginBody {
                install_source,
                plugin_source,
            })
            .send()
            .await
            .map_err(|source| RequestError {
                service: self.service.to_string(),
                url,
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_service_specific_clients() {
        assert_eq!(SidecarClient::monitor("http://localhost:9000").service, "monitor");
        assert_eq!(SidecarClient::controller("http://localhost:9001").service, "controller");
        assert_eq!(SidecarClient::visualizer("http://localhost:9002").service, "visualizer");
    }
}
