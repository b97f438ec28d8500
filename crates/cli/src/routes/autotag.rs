//! Single-image tagging and the batch job endpoints.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use curator_core::models::{BatchJobState, BatchRequest};
use curator_core::operations;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::server::error::AppError;
use crate::server::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/autotag/:filename", post(autotag_single))
        .route("/api/autotag-batch", post(submit_batch))
        .route("/api/autotag-batch/status", get(batch_status))
        .route("/api/autotag-batch/cancel", post(cancel_batch))
}

#[derive(Debug, Default, Deserialize)]
pub struct SingleRequest {
    pub threshold: Option<f32>,
}

/// POST /api/autotag/:filename returns the raw tags without saving them.
async fn autotag_single(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    body: Option<Json<SingleRequest>>,
) -> Result<Json<Value>, AppError> {
    let threshold = body.and_then(|Json(b)| b.threshold);
    let tags = operations::autotag_single(state.coordinator(), &filename, threshold).await?;
    Ok(Json(json!({ "tags": tags })))
}

async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let status = state.coordinator().submit(request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Batch process started.",
            "status": status,
        })),
    ))
}

async fn batch_status(State(state): State<AppState>) -> Json<BatchJobState> {
    Json(state.coordinator().status())
}

async fn cancel_batch(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let status = state.coordinator().cancel().await?;
    Ok(Json(json!({
        "message": "Batch process cancelled.",
        "status": status,
    })))
}
