use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::jobs::{JobId, SchedulingError, SubmitError};
use crate::session::BindError;

/// Errors returned by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not logged in")]
    Unauthenticated,

    #[error("No active task found")]
    NoActiveJob,

    #[error("Task {0} not found")]
    JobNotFound(JobId),

    #[error("{0}")]
    InvalidOptions(String),

    #[error("Task {0} is still running")]
    JobAlreadyActive(JobId),

    #[error("Another task submission is in progress")]
    SubmissionInProgress,

    #[error("Could not start the task: {0}")]
    Scheduling(SchedulingError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NoActiveJob | ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            ApiError::JobAlreadyActive(_) | ApiError::SubmissionInProgress => StatusCode::CONFLICT,
            ApiError::Scheduling(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::NoActiveJob => "no_active_job",
            ApiError::JobNotFound(_) => "job_not_found",
            ApiError::InvalidOptions(_) => "invalid_options",
            ApiError::JobAlreadyActive(_) => "job_already_active",
            ApiError::SubmissionInProgress => "submission_in_progress",
            ApiError::Scheduling(_) => "scheduling_failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Unauthenticated => json!({ "logged_in": false }),
            ApiError::Scheduling(_) => json!({
                "success": false,
                "error": self.code(),
                "message": self.to_string(),
            }),
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::UnrecognizedOption(_) => ApiError::InvalidOptions(e.to_string()),
            SubmitError::Scheduling { source, .. } => ApiError::Scheduling(source),
        }
    }
}

impl From<BindError> for ApiError {
    fn from(e: BindError) -> Self {
        match e {
            BindError::SubmissionInProgress => ApiError::SubmissionInProgress,
            BindError::JobStillActive(job_id) => ApiError::JobAlreadyActive(job_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn no_active_job_is_a_structured_not_found() {
        let (status, body) = body_json(ApiError::NoActiveJob).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({"error": "no_active_job", "message": "No active task found"})
        );
    }

    #[tokio::test]
    async fn unauthenticated_reports_logged_out() {
        let (status, body) = body_json(ApiError::Unauthenticated).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"logged_in": false}));
    }

    #[tokio::test]
    async fn scheduling_failure_is_unsuccessful_submission() {
        let (status, body) = body_json(ApiError::from(SubmitError::Scheduling {
            job_id: JobId("j".to_string()),
            source: SchedulingError::QueueFull,
        }))
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("scheduling_failed"));
    }

    #[test]
    fn submit_and_bind_errors_mapping() {
        let e = ApiError::from(SubmitError::UnrecognizedOption("foo".to_string()));
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.to_string(), "Unrecognized task option: foo");

        let e = ApiError::from(BindError::SubmissionInProgress);
        assert_eq!(e.status_code(), StatusCode::CONFLICT);

        let e = ApiError::from(BindError::JobStillActive(JobId("j".to_string())));
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
        assert!(matches!(e, ApiError::JobAlreadyActive(_)));
    }
}
