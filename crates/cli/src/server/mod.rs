pub mod error;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use curator_core::media::mount_points;
use storage::Tree;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use self::state::AppState;

/// Build the full axum router: JSON API, tree file mounts and the optional
/// static front-end.
pub fn build_router(state: AppState, public_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    // API responses are never cached.
    let no_cache = SetResponseHeaderLayer::if_not_present(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );

    let api = Router::new()
        .route("/health", get(health))
        .merge(crate::routes::media::router())
        .merge(crate::routes::tags::router())
        .merge(crate::routes::files::router())
        .merge(crate::routes::autotag::router())
        .layer(no_cache);

    let layout = state.layout().clone();
    let mut app = api;
    for tree in [Tree::Active, Tree::Rejected] {
        let (images, thumbs) = mount_points(tree);
        app = app
            .nest_service(images, ServeDir::new(layout.dir(tree)))
            .nest_service(thumbs, ServeDir::new(layout.thumbnails(tree)));
    }

    if let Some(public) = public_dir.filter(|p| p.is_dir()) {
        app = app.fallback_service(ServeDir::new(public));
    }

    app.layer(cors).with_state(state)
}

/// Serve until ctrl-c, then stop the batch job and scorer.
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let public_dir = state.config().server.public_dir.as_ref().map(PathBuf::from);
    let app = build_router(state.clone(), public_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("serving {} on http://{}", state.layout().dir(Tree::Active).display(), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    state.shutdown().await;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}
