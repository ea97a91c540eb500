pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
    Router,
};

use crate::runs::handlers;
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// GET /
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health::health_handler))
        .route("/api/v1/options", get(handlers::handle_get_options))
        .route("/api/v1/runs", post(handlers::handle_create_run))
        .route("/api/v1/progress", get(handlers::handle_get_progress))
        .route(
            "/api/v1/history",
            get(handlers::handle_list_history).delete(handlers::handle_clear_history),
        )
        .route("/api/v1/history/:id", get(handlers::handle_get_entry))
        .route(
            "/api/v1/history/:id/export/:section",
            get(handlers::handle_export),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
