//! Route modules for Bili Relay Server

pub mod health;
pub mod publish;
pub mod submit;
pub mod upload;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full HTTP gateway
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config().upload.max_body_bytes;

    Router::new()
        .nest("/api/upload", upload::router().merge(publish::router()))
        .nest("/api/submit", submit::router())
        .nest("/api", health::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
