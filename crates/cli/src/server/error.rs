use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use curator_core::JobError;
use storage::StorageError;

/// Handler error rendered as `{"message": ...}` with a matching status.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(m) => write!(f, "Not found: {}", m),
            AppError::BadRequest(m) => write!(f, "Bad request: {}", m),
            AppError::Conflict(m) => write!(f, "Conflict: {}", m),
            AppError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m),
            AppError::Internal(m) => {
                tracing::error!("request failed: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

impl From<JobError> for AppError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Conflict => AppError::Conflict(e.to_string()),
            JobError::NotRunning => AppError::NotFound(e.to_string()),
            JobError::NotFound(_) => AppError::NotFound(e.to_string()),
            JobError::Invalid(m) => AppError::BadRequest(m),
            JobError::Storage(StorageError::NotFound(_)) => AppError::NotFound(e.to_string()),
            JobError::Storage(StorageError::InvalidFilename(_)) => {
                AppError::BadRequest(e.to_string())
            }
            JobError::Storage(_) | JobError::Scorer(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", e))
    }
}
