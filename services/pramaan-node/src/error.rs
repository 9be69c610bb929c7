use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pramaan_attendance::AttendanceError;
use pramaan_core::ErrorKind;
use pramaan_identity::IdentityError;
use serde_json::json;
use tracing::error;

/// Failure as seen by an HTTP caller: a kind and its generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            status: status_for(kind),
            kind,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: ErrorKind::InvalidInput,
        }
    }

    pub fn bad_request() -> Self {
        Self::from_kind(ErrorKind::InvalidInput)
    }

    pub fn internal() -> Self {
        Self::from_kind(ErrorKind::Internal)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotEnrolled => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateBiometric
        | ErrorKind::AlreadyEnrolled
        | ErrorKind::ChallengeConsumed
        | ErrorKind::ReplayDetected => StatusCode::CONFLICT,
        ErrorKind::ChallengeExpired => StatusCode::GONE,
        ErrorKind::CommitmentMismatch | ErrorKind::InvalidProof => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::LocationRejected => StatusCode::FORBIDDEN,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind.as_str(),
            "message": self.kind.public_message(),
        }));
        (self.status, body).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let kind = err.kind();
        if matches!(kind, ErrorKind::Storage | ErrorKind::Internal) {
            error!(error = %err, "Enrollment request failed");
        }
        ApiError::from_kind(kind)
    }
}

impl From<AttendanceError> for ApiError {
    fn from(err: AttendanceError) -> Self {
        if let AttendanceError::RecordNotFound(_) = err {
            return ApiError::not_found();
        }
        let kind = err.kind();
        if matches!(kind, ErrorKind::Storage | ErrorKind::Internal) {
            error!(error = %err, "Attendance request failed");
        }
        ApiError::from_kind(kind)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!(error = %err, "Blocking task failed");
        ApiError::internal()
    }
}
