//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - session API under `/api/v1/...`
/// - static front-end from `./static` with index fallback
/// - permissive CORS and per-request trace spans
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/map", get(http::http_get_map))
        .route("/api/v1/sessions", post(http::http_enter_level))
        .route("/api/v1/sessions/:id", get(http::http_get_session))
        .route("/api/v1/sessions/:id/start", post(http::http_start))
        .route("/api/v1/sessions/:id/move", post(http::http_move_piece))
        .route("/api/v1/sessions/:id/code", post(http::http_edit_code))
        .route("/api/v1/sessions/:id/check", post(http::http_check))
        .route("/api/v1/sessions/:id/hint", post(http::http_hint))
        .route("/api/v1/sessions/:id/mode", post(http::http_switch_mode))
        .route("/api/v1/sessions/:id/restart", post(http::http_restart))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
