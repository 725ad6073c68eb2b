use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request, Response,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::Refusal;
use crate::model::common::eligibility::DenyReason;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// The requester does not own the resource.
    #[error("Permission denied: {0}")]
    Permission(String),
    /// The eligibility rules refused a vote.
    #[error("Vote refused: {0}")]
    Denied(#[from] DenyReason),
    #[error("Not found: {0}")]
    NotFound(String),
    /// A concurrent transaction kept conflicting with ours.
    #[error("Conflicting concurrent update, please retry")]
    StorageConflict,
    #[error(transparent)]
    Db(#[from] DbError),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The machine-readable reason code reported to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Permission(_) => "PermissionError",
            Self::Denied(reason) => reason.code(),
            Self::NotFound(_) => "NotFound",
            Self::StorageConflict => "StorageConflict",
            Self::Db(_) => "InternalError",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) | Self::Denied(_) => Status::BadRequest,
            Self::Permission(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::StorageConflict => Status::Conflict,
            Self::Db(_) => Status::InternalServerError,
        }
    }
}

/// The JSON body sent alongside every error status.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub reason: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let message = if status.class() == StatusClass::ServerError {
            // Storage internals are logged, not sent.
            error!("{self}");
            "Internal server error".to_string()
        } else {
            debug!("{self}");
            self.to_string()
        };
        Refusal::record(req, self.reason());
        let body = ErrorBody::new(self.reason(), message);
        Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denials_are_client_errors_with_their_own_code() {
        let err = Error::from(DenyReason::PollExpired);
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.reason(), "PollExpired");

        let err = Error::from(DenyReason::DuplicateVote);
        assert_eq!(err.reason(), "DuplicateVote");
    }

    #[test]
    fn permission_is_forbidden() {
        let err = Error::Permission("not yours".to_string());
        assert_eq!(err.status(), Status::Forbidden);
        assert_eq!(err.reason(), "PermissionError");
    }

    #[test]
    fn conflicts_are_not_reported_as_internal() {
        assert_eq!(Error::StorageConflict.status(), Status::Conflict);
        assert_eq!(Error::StorageConflict.reason(), "StorageConflict");
    }
}
