use backoff::backoff::Backoff;
use error::*;
use k8s_openapi::api::core::v1::{Pod, Service};
use log::debug;
use kube::api::PostParams;
use kube::Api;
use result::Result;
use serde_json;

use crate::errors::ApiError;

/// The maximum amount of time (in seconds) we'll spend polling a satellite pod's service
/// before giving up and tearing down what we created.
pub const MAXIMUM_POLLING_TIME: u64 = 30;

#[derive(ChronosError, Error, Kind, HttpCode, Debug)]
#[error(
    "Failed to serialize the Kubernetes service resource fronting the '{name}' satellite pod. \
    This is an internal error; retrying this operation is unlikely to help."
)]
#[code(Status::InternalServerError)]
pub struct ServiceSerializationError {
    name: String,
    #[source]
    source: serde_json::Error,
}

#[derive(ChronosError, Error, Kind, HttpCode, Debug)]
#[error(
    "Timed out after {seconds}s waiting for the '{name}' satellite pod to start accepting \
    connections on {address}. Its pod and service have been torn down."
)]
#[code(Status::ServiceUnavailable)]
pub struct ProvisioningTimeout {
    name: String,
    address: String,
    seconds: u64,
}

fn service<N: AsRef<str>>(name: N, port: u16) -> Result<Service> {
    let name = name.as_ref();
    let svc: Service = serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": super::SUBMISSIONS_NAMESPACE,
        },
        "spec": {
            "type": "ClusterIP",
            "selector": {"app_id": name},
            "ports": [
                {"port": port, "targetPort": port, "protocol": "TCP"}
            ]
        }
    }))
    .map_err(|source| ServiceSerializationError {
        name: name.to_string(),
        source,
    })?;
    Ok(svc)
}

/// Creates a named `Pod`+`Service` pair running `reference` and listening on `port`, then
/// polls the service's address with a plain TCP connect (exponential backoff, same idiom as
/// the executor's job-watching loop) until a connection succeeds or `MAXIMUM_POLLING_TIME`
/// elapses. On timeout, the partially-created pod and service are deleted before returning
/// the error.
async fn provision<N: AsRef<str>>(name: N, reference: &str, port: u16) -> Result<Pod> {
    let name = name.as_ref();
    let pod = crate::pod::new(reference, name, port)?;
    let svc = service(name, port)?;

    let pod_client: Api<Pod> = crate::client::new().await;
    let svc_client: Api<Service> = crate::client::new().await;

    let pod = pod_client
        .create(&PostParams::default(), &pod)
        .await
        .map_err(ApiError::from)?;
    svc_client
        .create(&PostParams::default(), &svc)
        .await
        .map_err(ApiError::from)?;

    let address = format!(
        "{}.{}.svc.cluster.local:{}",
        name,
        super::SUBMISSIONS_NAMESPACE,
        port
    );

    match wait_until_reachable(&address).await {
        Ok(()) => Ok(pod),
        Err(_) => {
            let _ = crate::delete::<Pod, _>(name).await;
            let _ = crate::delete::<Service, _>(name).await;
            Err(ProvisioningTimeout {
                name: name.to_string(),
                address,
                seconds: MAXIMUM_POLLING_TIME,
            }
            .into())
        }
    }
}

async fn wait_until_reachable(address: &str) -> Result<()> {
    let mut b = backoff::ExponentialBackoff::default();
    b.max_elapsed_time = Some(std::time::Duration::from_secs(MAXIMUM_POLLING_TIME));
    loop {
        match b.next_backoff() {
            None => {
                return Err(ProvisioningTimeout {
                    name: address.to_string(),
                    address: address.to_string(),
                    seconds: MAXIMUM_POLLING_TIME,
                }
                .into())
            }
            Some(duration) => {
                tokio::time::sleep(duration).await;
                let patience = tokio::time::Duration::from_secs(MAXIMUM_POLLING_TIME)
                    .checked_sub(b.get_elapsed_time())
                    .unwrap_or(tokio::time::Duration::from_secs(0));
                match tokio::time::timeout(patience, tokio::net::TcpStream::connect(address))
                    .await
                {
                    Ok(Ok(_)) => return Ok(()),
                    Ok(Err(err)) => {
                        debug!("Could not connect to {}, {:?}", address, err);
                        continue;
                    }
                    Err(_) => continue,
                }
            }
        }
    }
}

/// Provisions the redis-compatible work-queue pod for a submission, named `{app_id}-queue`.
pub async fn provision_work_queue<N: AsRef<str>>(
    app_id: N,
    reference: &str,
    port: u16,
) -> Result<Pod> {
    provision(format!("{}-queue", app_id.as_ref()), reference, port).await
}

/// Provisions the metrics-database pod for a submission, named `{app_id}-metrics`.
pub async fn provision_metrics_db<N: AsRef<str>>(
    app_id: N,
    reference: &str,
    port: u16,
) -> Result<Pod> {
    provision(format!("{}-metrics", app_id.as_ref()), reference, port).await
}
