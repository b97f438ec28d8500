use axum::extract::{Path as AxumPath, State};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use curator_core::operations;
use serde::Deserialize;
use serde_json::{json, Value};
use storage::mover::ExportSummary;

use crate::server::error::AppError;
use crate::server::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reject/:filename", post(reject))
        .route("/api/restore/:filename", post(restore))
        .route("/api/reject-by-score", post(reject_by_score))
        .route("/api/export-final-dataset", post(export_final_dataset))
}

/// POST /api/reject/:filename moves an active image into the rejected tree.
async fn reject(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> Result<Json<Value>, AppError> {
    let moved = operations::reject(state.layout(), &filename).await?;
    Ok(Json(json!({
        "message": format!("{} rejected", filename),
        "moved": moved,
    })))
}

async fn restore(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> Result<Json<Value>, AppError> {
    let moved = operations::restore(state.layout(), &filename).await?;
    Ok(Json(json!({
        "message": format!("{} restored", filename),
        "moved": moved,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RejectByScoreRequest {
    #[serde(default)]
    pub filenames: Vec<String>,
    pub threshold: f32,
}

async fn reject_by_score(
    State(state): State<AppState>,
    Json(body): Json<RejectByScoreRequest>,
) -> Result<Json<Value>, AppError> {
    let rejected =
        operations::reject_by_score(state.layout(), &body.filenames, body.threshold).await?;
    Ok(Json(json!({ "rejected": rejected })))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub filenames: Vec<String>,
}

async fn export_final_dataset(
    State(state): State<AppState>,
    Json(body): Json<ExportRequest>,
) -> Result<Json<ExportSummary>, AppError> {
    Ok(Json(
        operations::export_final_dataset(state.layout(), &body.filenames).await?,
    ))
}
