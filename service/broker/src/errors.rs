//! The broker's own error taxonomy. Every failure the HTTP layer can surface
//! is one of these six kinds; `routes.rs` never constructs an ad hoc error,
//! it bubbles these up through `result::Result` and lets `Response`'s
//! `Responder` impl turn them into the `{"payload": null, "error": {...}}`
//! envelope.

use error::*;
use result::Result;

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("{message}")]
#[code(Status::BadRequest)]
pub struct BadRequest {
    pub message: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("not authorized to act on submission '{app_id}'")]
#[code(Status::Unauthorized)]
pub struct Unauthorized {
    pub app_id: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("no submission exists with id '{app_id}'")]
#[code(Status::NotFound)]
pub struct SubmissionNotFound {
    pub app_id: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to provision resources for submission '{app_id}'")]
#[code(Status::InternalServerError)]
pub struct Provisioning {
    pub app_id: String,
    #[source]
    pub source: StringError,
}

/// A failure in a collaborator (monitor, controller, visualizer, the work
/// queue, or a cluster's API server) that is expected to be transient. The
/// executor logs these and continues; they do not move a submission to
/// `Error`.
#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("collaborator '{collaborator}' failed for submission '{app_id}'")]
#[code(Status::BadGateway)]
pub struct TransientCollaborator {
    pub app_id: String,
    pub collaborator: String,
    #[source]
    pub source: StringError,
}

/// A failure with no sensible recovery. The executor transitions the
/// submission to `Error` and this is surfaced to the caller verbatim.
#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("internal error handling submission '{app_id}'")]
#[code(Status::InternalServerError)]
pub struct FatalInternal {
    pub app_id: String,
    #[source]
    pub source: StringError,
}

pub fn provisioning(app_id: impl Into<String>, source: impl Into<Box<dyn ChronosError>>) -> Box<dyn ChronosError> {
    Provisioning {
        app_id: app_id.into(),
        source: source.into().into(),
    }
    .into()
}

pub fn transient(
    app_id: impl Into<String>,
    collaborator: impl Into<String>,
    source: impl Into<Box<dyn ChronosError>>,
) -> Box<dyn ChronosError> {
    TransientCollaborator {
        app_id: app_id.into(),
        collaborator: collaborator.into(),
        source: source.into().into(),
    }
    .into()
}

pub fn fatal(app_id: impl Into<String>, source: impl Into<Box<dyn ChronosError>>) -> Box<dyn ChronosError> {
    FatalInternal {
        app_id: app_id.into(),
        source: source.into().into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_carries_its_message() {
        let err: Box<dyn ChronosError> = BadRequest {
            message: "missing field 'img'".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "missing field 'img'");
    }

    #[test]
    fn not_found_kind_names_the_struct() {
        let err = SubmissionNotFound {
            app_id: "kj-1234".to_string(),
        };
        assert_eq!(kind::Kind::kind(&err), "SubmissionNotFound");
    }
}
