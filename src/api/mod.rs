//! HTTP control surface: status, script submission, settings, mapping reload
//! and history.

pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/run", post(handlers::run))
        .route("/api/settings", put(handlers::update_settings))
        .route("/api/mappings/reload", post(handlers::reload_mappings))
        .route("/api/history", get(handlers::history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
