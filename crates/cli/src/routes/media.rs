use axum::extract::{Path as AxumPath, Query, State};
use axum::response::Json;
use axum::routing::{get, put};
use axum::Router;
use curator_core::models::MediaItem;
use curator_core::{media, operations};
use serde::Deserialize;
use serde_json::{json, Value};
use storage::Tree;

use crate::server::error::AppError;
use crate::server::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/media", get(list_media))
        .route("/api/media/:filename", put(save_media).delete(delete_media))
        .route("/api/rating/:filename", put(set_rating))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub view: Option<String>,
}

/// GET /api/media?view=active|rejected
async fn list_media(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<MediaItem>>, AppError> {
    let tree = match q.view.as_deref() {
        None | Some("active") => Tree::Active,
        Some("rejected") => Tree::Rejected,
        Some(other) => return Err(AppError::BadRequest(format!("unknown view: {}", other))),
    };
    Ok(Json(media::list_media(state.layout(), tree).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub content: String,
    #[serde(default)]
    pub is_rejected: bool,
}

/// PUT /api/media/:filename
async fn save_media(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    Json(body): Json<SaveRequest>,
) -> Result<Json<Value>, AppError> {
    let tree = if body.is_rejected {
        Tree::Rejected
    } else {
        Tree::Active
    };
    let tags = operations::save_content(state.layout(), tree, &filename, &body.content).await?;
    Ok(Json(json!({
        "message": format!("Tags saved for {}", filename),
        "content": tags.to_content(),
    })))
}

/// DELETE /api/media/:filename
async fn delete_media(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> Result<Json<Value>, AppError> {
    operations::delete_media(state.layout(), &filename).await?;
    Ok(Json(json!({ "message": format!("Deleted {}", filename) })))
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: Option<u8>,
}

/// PUT /api/rating/:filename
async fn set_rating(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    Json(body): Json<RatingRequest>,
) -> Result<Json<Value>, AppError> {
    let tags = operations::set_rating(state.layout(), &filename, body.rating).await?;
    Ok(Json(json!({
        "message": format!("Rating updated for {}", filename),
        "rating": tags.rating(),
    })))
}
