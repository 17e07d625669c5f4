//! Video submission
//!
//! - POST /api/submit/video - Publish an assembled upload with its metadata

use axum::{extract::State, routing::post, Json, Router};

use crate::remote::{SubmitRequest, SubmitResult};
use crate::state::AppState;
use crate::upload::UploadError;

pub fn router() -> Router<AppState> {
    Router::new().route("/video", post(submit_video))
}

/// POST /api/submit/video
async fn submit_video(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResult>, UploadError> {
    let result = state.sessions().submit_metadata(&request).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{self, json_request, MockRemote};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_submit_video() {
        let remote = MockRemote::new();
        let app = test_support::app(remote.clone());

        let response = app
            .oneshot(json_request(
                "/api/submit/video",
                serde_json::json!({
                    "upos_uri": "upos://ugc/demo.mp4",
                    "title": "Demo",
                    "tags": "rust,relay",
                    "tid": 21,
                    "copyright": 1,
                }),
            ))
            .await
            .unwrap();
        let (status, body) = test_support::read_json(response).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["bvid"].as_str().unwrap().starts_with("BV"));
        assert_eq!(remote.submitted.lock().unwrap()[0].title, "Demo");
    }

    #[tokio::test]
    async fn test_repost_without_source_is_rejected() {
        let remote = MockRemote::new();
        let app = test_support::app(remote.clone());

        let response = app
            .oneshot(json_request(
                "/api/submit/video",
                serde_json::json!({
                    "upos_uri": "upos://ugc/demo.mp4",
                    "title": "Demo",
                    "tid": 21,
                    "copyright": 2,
                }),
            ))
            .await
            .unwrap();
        let (status, body) = test_support::read_json(response).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(MockRemote::calls(&remote.submit_calls), 0);
    }
}
