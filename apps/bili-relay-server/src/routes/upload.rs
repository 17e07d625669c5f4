//! Upload Routes
//!
//! HTTP endpoints for the UPOS chunked upload protocol.
//!
//! Endpoints:
//! - POST /api/upload/init - Negotiate an upload session
//! - POST /api/upload/chunk - Forward one chunk (multipart)
//! - POST /api/upload/complete - Finalize and retire the session
//! - GET /api/upload/status/{upload_id} - Get session status
//! - POST /api/upload/cover - Upload a cover image (multipart)

use std::str::FromStr;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::remote::{CoverResult, FinalizeResult};
use crate::state::AppState;
use crate::upload::{ChunkUpload, CompleteUpload, SessionHandle, SessionSnapshot, UploadError};

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub filename: String,
    pub filesize: u64,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub upload_id: String,
    pub chunk_index: u32,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub upload_id: String,
    /// Accepted for compatibility; the session's biz_id is authoritative
    #[serde(default)]
    pub biz_id: i64,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filesize: u64,
    pub md5: String,
    pub crc32: String,
    pub hash: String,
    #[serde(default)]
    pub auth: String,
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/init", post(init_upload))
        .route("/chunk", post(upload_chunk))
        .route("/complete", post(complete_upload))
        .route("/status/{upload_id}", get(upload_status))
        .route("/cover", post(upload_cover))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/upload/init
///
/// Negotiate with the platform and open a session.
async fn init_upload(
    State(state): State<AppState>,
    Json(request): Json<InitRequest>,
) -> Result<Json<SessionHandle>, UploadError> {
    let handle = state
        .sessions()
        .init_upload(&request.filename, request.filesize)
        .await?;

    Ok(Json(handle))
}

/// POST /api/upload/chunk
///
/// Multipart body: `file_chunk` plus the form fields `upload_id`,
/// `chunk_index`, `total_chunks`, `md5`, `crc32`, `hash` and `auth`.
async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkResponse>, UploadError> {
    let mut form = ChunkForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file_chunk" {
            form.payload = Some(field.bytes().await.map_err(multipart_error)?);
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.set(&name, value);
        }
    }

    let (upload_id, chunk) = form.into_chunk()?;

    tracing::debug!(
        session_id = %upload_id,
        chunk_index = chunk.chunk_index,
        size = chunk.payload.len(),
        "Received chunk"
    );

    let ack = state.sessions().upload_chunk(&upload_id, chunk).await?;

    Ok(Json(ChunkResponse {
        upload_id,
        chunk_index: ack.chunk_index,
    }))
}

/// POST /api/upload/complete
///
/// Ask the platform to assemble the chunks. The session is retired on success.
async fn complete_upload(
    State(state): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<FinalizeResult>, UploadError> {
    if request.upload_id.is_empty() {
        return Err(UploadError::Validation("upload_id is required".to_string()));
    }

    let result = state
        .sessions()
        .complete_upload(
            &request.upload_id,
            CompleteUpload {
                filename: request.filename,
                filesize: request.filesize,
                md5: request.md5,
                crc32: request.crc32,
                hash: request.hash,
                auth: request.auth,
            },
        )
        .await?;

    Ok(Json(result))
}

/// GET /api/upload/status/{upload_id}
async fn upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<SessionSnapshot>, UploadError> {
    let snapshot = state.sessions().status(&upload_id).await?;
    Ok(Json(snapshot))
}

/// POST /api/upload/cover
///
/// Multipart body with the image in `cover_file`.
async fn upload_cover(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CoverResult>, UploadError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("cover_file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("cover.jpg").to_string();
        let data = field.bytes().await.map_err(multipart_error)?;

        let result = state.sessions().upload_cover(&filename, &data).await?;
        tracing::info!(filename = %filename, url = %result.url, "Cover uploaded");
        return Ok(Json(result));
    }

    Err(UploadError::Validation("cover_file is required".to_string()))
}

// ============================================================================
// Helper Functions
// ============================================================================

pub(crate) fn multipart_error(e: MultipartError) -> UploadError {
    UploadError::Validation(format!("malformed multipart body: {}", e.body_text()))
}

/// Chunk form fields as they arrive, in any order
#[derive(Default)]
struct ChunkForm {
    upload_id: Option<String>,
    chunk_index: Option<String>,
    total_chunks: Option<String>,
    md5: String,
    crc32: String,
    hash: String,
    auth: String,
    payload: Option<Bytes>,
}

impl ChunkForm {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "upload_id" => self.upload_id = Some(value),
            "chunk_index" => self.chunk_index = Some(value),
            "total_chunks" => self.total_chunks = Some(value),
            "md5" => self.md5 = value,
            "crc32" => self.crc32 = value,
            "hash" => self.hash = value,
            "auth" => self.auth = value,
            // biz_id and anything unknown
            _ => {}
        }
    }

    fn into_chunk(self) -> Result<(String, ChunkUpload), UploadError> {
        let upload_id = self
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UploadError::Validation("upload_id is required".to_string()))?;
        let payload = self
            .payload
            .ok_or_else(|| UploadError::Validation("file_chunk is required".to_string()))?;

        let chunk = ChunkUpload {
            chunk_index: parse_field("chunk_index", self.chunk_index)?,
            total_chunks: parse_field("total_chunks", self.total_chunks)?,
            payload,
            md5: self.md5,
            crc32: self.crc32,
            hash: self.hash,
            auth: self.auth,
        };

        Ok((upload_id, chunk))
    }
}

fn parse_field<T: FromStr>(name: &str, value: Option<String>) -> Result<T, UploadError> {
    let value = value.ok_or_else(|| UploadError::Validation(format!("{} is required", name)))?;
    value
        .trim()
        .parse()
        .map_err(|_| UploadError::Validation(format!("invalid {}: {}", name, value)))
}
