use axum::extract::{Path as AxumPath, State};
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use curator_core::models::TagCount;
use curator_core::{media, operations};
use serde_json::{json, Value};

use crate::server::error::AppError;
use crate::server::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tags", get(list_tags))
        .route("/api/tags/:tag", delete(delete_tag))
        .route("/api/clear-ratings", post(clear_ratings))
        .route("/api/clear-aesthetic-scores", post(clear_aesthetic_scores))
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagCount>>, AppError> {
    Ok(Json(media::tag_counts(state.layout()).await?))
}

/// DELETE /api/tags/:tag removes the tag from every active sidecar.
async fn delete_tag(
    State(state): State<AppState>,
    AxumPath(tag): AxumPath<String>,
) -> Result<Json<Value>, AppError> {
    let changed = operations::delete_tag(state.layout(), &tag).await?;
    Ok(Json(json!({
        "message": format!("Tag '{}' removed from {} files", tag.trim(), changed),
        "filesChanged": changed,
    })))
}

async fn clear_ratings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let changed = operations::clear_ratings(state.layout()).await?;
    Ok(Json(json!({
        "message": format!("Ratings cleared from {} files", changed),
        "filesChanged": changed,
    })))
}

async fn clear_aesthetic_scores(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let changed = operations::clear_aesthetic_scores(state.layout()).await?;
    Ok(Json(json!({
        "message": format!("Aesthetic scores cleared from {} files", changed),
        "filesChanged": changed,
    })))
}
