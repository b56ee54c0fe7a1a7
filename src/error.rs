//! Submission-facing errors: the only errors that cross the manager
//! boundary synchronously (spec §7 "Submission errors"). Everything that
//! happens after admission is captured on the `Process` and surfaced only
//! through state transitions and the `StateStore`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmissionError {
    /// `schedule` found an active process with the same `operation_id` (O1).
    #[error("operation already scheduled: {0}")]
    DuplicateOperation(String),

    /// The mission payload is missing required keys.
    #[error("invalid mission payload: {0}")]
    InvalidPayload(String),

    /// Neither a submission nor a startup error; something unexpected
    /// happened while talking to a collaborator (store, container host).
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SubmissionError::DuplicateOperation(_) => (StatusCode::CONFLICT, "DUPLICATE_OPERATION"),
            SubmissionError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
            SubmissionError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, SubmissionError>;
