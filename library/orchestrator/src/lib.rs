pub mod client;
pub mod errors;
pub mod job;
pub mod pod;
pub mod provision;

pub use job::JobExt;
pub use pod::PodExt;

use either::Either;
use kube::api::DeleteParams;
use kube::core::Resource;
use kube::Api;
use result::Result;

use errors::ApiError;
use kube::core::response::Status;
use kube::error::ErrorResponse;

/// The namespace in which per-submission jobs, work-queue pods, and metrics-db pods live.
pub const SUBMISSIONS_NAMESPACE: &str = "chronos-submissions";

/// Delete a named resource of kind `K` from the submissions namespace.
///
/// When you get a `K` via `Left`, your delete has started. When you get a `Status` via
/// `Right`, the resource was already gone (a 404 from the API server is treated as a
/// successful, idempotent delete rather than an error).
///
/// Any other 4XX or 5XX status is returned as an `Err(Box<dyn ChronosError>)`.
pub async fn delete<K, I>(id: I) -> Result<Either<K, Status>>
where
    I: AsRef<str>,
    K: Clone + std::fmt::Debug + serde::de::DeserializeOwned,
    <K as Resource>::DynamicType: Default,
    K: k8s_openapi::Metadata<Ty = kube::api::ObjectMeta>,
{
    let client: Api<K> = client::new().await;
    Ok(client
        .delete(
            id.as_ref(),
            &DeleteParams {
                dry_run: false,
                // We return immediately, but the resource is given 60 seconds to shut down cleanly.
                grace_period_seconds: Some(60),
                propagation_policy: Some(kube::api::PropagationPolicy::Foreground),
                preconditions: None,
            },
        )
        .await
        .or_else(|result| match result {
            kube::error::Error::Api(ErrorResponse { code: 404, .. }) => {
                Ok(Either::Right(kube::core::response::Status {
                    status: "".to_string(),
                    message: "".to_string(),
                    reason: "".to_string(),
                    details: None,
                    code: 0,
                }))
            }
            err => Err(err),
        })
        .map_err(ApiError::from)?)
}
