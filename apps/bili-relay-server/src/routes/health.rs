//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// Whether platform credentials are configured
    pub authenticated: bool,
    pub active_sessions: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "bili-relay-server",
        authenticated: state.sessions().is_authenticated(),
        active_sessions: state.sessions().store().len().await,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{self, get_request, MockRemote};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let app = test_support::app(MockRemote::new());

        let response = app.oneshot(get_request("/api/health")).await.unwrap();
        let (status, body) = test_support::read_json(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["active_sessions"], 0);
    }
}
