//! One-click publishing and local transcoding
//!
//! Endpoints:
//! - POST /api/upload/bilibili - Relay a whole video and submit it (multipart)
//! - POST /api/upload/process - Transcode a file in the upload directory

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::upload::multipart_error;
use crate::error::{AppError, Result};
use crate::publish::{PublishError, PublishRequest, PublishResult};
use crate::state::AppState;
use crate::transcode::{Quality, Resolution, TranscodeOptions};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/bilibili",
            post(publish_video).layer(DefaultBodyLimit::disable()),
        )
        .route("/process", post(process_video))
}

// ============================================================================
// One-click publish
// ============================================================================

/// POST /api/upload/bilibili
///
/// Multipart body: `video` file plus `title`, `desc`, `tags` and `category`.
/// The video is spooled to the temp directory, relayed chunk by chunk,
/// then submitted.
async fn publish_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PublishResult>> {
    let publisher = state.publisher();
    let mut spooled = None;
    let mut request = PublishRequest {
        title: String::new(),
        desc: String::new(),
        tags: String::new(),
        category: String::new(),
        cover: String::new(),
    };

    let read = async {
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();

            if name == "video" {
                if spooled.is_some() {
                    continue;
                }
                let filename = field.file_name().unwrap_or("video.mp4").to_string();
                let path = publisher.spool_path(&filename).await?;
                spooled = Some((path.clone(), filename));

                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(PublishError::from)?;
                while let Some(bytes) = field.chunk().await.map_err(multipart_error)? {
                    file.write_all(&bytes)
                        .await
                        .map_err(PublishError::from)?;
                }
                file.flush().await.map_err(PublishError::from)?;
                continue;
            }

            let value = field.text().await.map_err(multipart_error)?;
            match name.as_str() {
                "title" => request.title = value,
                "desc" => request.desc = value,
                "tags" => request.tags = value,
                "category" => request.category = value,
                "cover" => request.cover = value,
                _ => {}
            }
        }
        Ok::<_, AppError>(())
    };
    let read_result = read.await;

    let Some((path, filename)) = spooled else {
        read_result?;
        return Err(AppError::BadRequest("video file is required".to_string()));
    };

    let validation = read_result.and_then(|_| {
        if request.title.trim().is_empty() {
            Err(AppError::BadRequest("title is required".to_string()))
        } else {
            Ok(())
        }
    });
    if let Err(e) = validation {
        if let Err(remove_err) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %remove_err, "Failed to remove spooled upload");
        }
        return Err(e);
    }

    tracing::info!(filename = %filename, title = %request.title, "One-click publish started");

    let result = publisher.publish_spooled(&path, &filename, &request).await?;

    tracing::info!(bvid = %result.bvid, url = %result.url, "One-click publish finished");
    Ok(Json(result))
}

// ============================================================================
// Transcoding
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub filename: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    /// False when no ffmpeg binary is installed
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// POST /api/upload/process
async fn process_video(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>> {
    let options = TranscodeOptions {
        quality: request.quality.parse::<Quality>()?,
        resolution: request
            .resolution
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(str::parse::<Resolution>)
            .transpose()?,
    };

    let transcoder = state.transcoder();
    if !transcoder.is_available().await {
        return Ok(Json(ProcessResponse {
            available: false,
            message: "ffmpeg is not installed; the original file is unchanged".to_string(),
            output: None,
        }));
    }

    let output = transcoder.transcode(&request.filename, options).await?;

    Ok(Json(ProcessResponse {
        available: true,
        message: "Video processed".to_string(),
        output: Some(output),
    }))
}
