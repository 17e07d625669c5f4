//! Upload types for the UPOS chunked protocol

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::{NegotiateResult, RemoteError};

// ============================================================================
// Constants
// ============================================================================

/// Container extensions accepted by `init_upload` (lowercase, no dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "mkv", "webm", "m4v"];

/// Image extensions accepted as covers
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

// ============================================================================
// Session Types
// ============================================================================

/// Lifecycle state of an upload session.
///
/// Only `Initialized` is ever stored; the terminal states show up in logs
/// and, to callers, as `SessionNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Negotiated and accepting chunks
    Initialized,
    /// Finalized by the platform, removed from the store
    Completed,
    /// Reaped after the expiry window, removed from the store
    Expired,
}

/// One in-flight upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSession {
    /// Platform-issued upload id
    pub session_id: String,
    pub biz_id: i64,
    /// Remote URL the chunks go to
    pub endpoint: String,
    pub chunk_size: u64,
    pub expected_chunk_count: u32,
    /// Signing token replayed on every call for this session
    pub auth_token: String,
    pub filename: String,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    /// Chunk indices the platform has acknowledged
    pub received_chunks: BTreeSet<u32>,
    /// Set while a finalize call is in flight; at most one caller holds it
    pub finalizing: bool,
}

impl UploadSession {
    /// Build a session from a successful negotiation
    pub fn from_negotiation(
        negotiated: NegotiateResult,
        filename: &str,
        total_size: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let expected_chunk_count = if negotiated.chunks > 0 {
            negotiated.chunks
        } else {
            chunk_count(total_size, negotiated.chunk_size)
        };

        Self {
            session_id: negotiated.upload_id,
            biz_id: negotiated.biz_id,
            endpoint: negotiated.endpoint,
            chunk_size: negotiated.chunk_size,
            expected_chunk_count,
            auth_token: negotiated.auth,
            filename: filename.to_string(),
            total_size,
            created_at,
            state: SessionState::Initialized,
            received_chunks: BTreeSet::new(),
            finalizing: false,
        }
    }

    /// Whether the session is older than `max_age` at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.created_at > max_age
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            upload_id: self.session_id.clone(),
            biz_id: self.biz_id,
            endpoint: self.endpoint.clone(),
            chunk_size: self.chunk_size,
            chunks: self.expected_chunk_count,
            auth: self.auth_token.clone(),
        }
    }
}

/// Number of `chunk_size` slices needed to cover `total_size` bytes
pub fn chunk_count(total_size: u64, chunk_size: u64) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    let count = total_size.div_ceil(chunk_size);
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Lowercased extension of `filename`, if any
pub fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_video_file(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_image_file(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

// ============================================================================
// Protocol Types
// ============================================================================

/// Negotiated parameters handed back to the client after `init`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub upload_id: String,
    pub biz_id: i64,
    pub endpoint: String,
    pub chunk_size: u64,
    pub chunks: u32,
    pub auth: String,
}

/// One chunk as received from the client. The integrity tokens are
/// computed by the client and forwarded untouched; the platform checks them.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub payload: bytes::Bytes,
    pub md5: String,
    pub crc32: String,
    pub hash: String,
    pub auth: String,
}

/// Whole-file tokens sent with `complete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteUpload {
    pub filename: String,
    pub filesize: u64,
    pub md5: String,
    pub crc32: String,
    pub hash: String,
    pub auth: String,
}

/// Session snapshot for status polling
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub upload_id: String,
    pub biz_id: i64,
    pub endpoint: String,
    pub chunk_size: u64,
    pub chunks: u32,
    pub filename: String,
    pub filesize: u64,
    pub state: SessionState,
    pub received_chunks: Vec<u32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(session: UploadSession, ttl: chrono::Duration) -> Self {
        Self {
            expires_at: session.created_at + ttl,
            upload_id: session.session_id,
            biz_id: session.biz_id,
            endpoint: session.endpoint,
            chunk_size: session.chunk_size,
            chunks: session.expected_chunk_count,
            filename: session.filename,
            filesize: session.total_size,
            state: session.state,
            received_chunks: session.received_chunks.into_iter().collect(),
            created_at: session.created_at,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),

    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    #[error("Upload session already exists: {0}")]
    DuplicateSession(String),

    #[error("Upload session is already being finalized: {0}")]
    FinalizeInProgress(String),

    #[error("Pre-upload negotiation failed: {0}")]
    NegotiationFailed(#[source] RemoteError),

    #[error("Chunk {chunk_index} transfer failed: {source}")]
    ChunkTransfer {
        chunk_index: u32,
        #[source]
        source: RemoteError,
    },

    #[error("Finalize failed: {0}")]
    Finalize(#[source] RemoteError),

    #[error("Submit failed: {0}")]
    SubmitFailed(#[source] RemoteError),

    #[error("Cover upload failed: {0}")]
    CoverFailed(#[source] RemoteError),
}

impl UploadError {
    /// The remote failure behind this error, if any
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::NegotiationFailed(e)
            | Self::ChunkTransfer { source: e, .. }
            | Self::Finalize(e)
            | Self::SubmitFailed(e)
            | Self::CoverFailed(e) => Some(e),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::FinalizeInProgress(_) => "FINALIZE_IN_PROGRESS",
            Self::NegotiationFailed(e) if e.is_network() => "NETWORK_ERROR",
            Self::NegotiationFailed(_) => "NEGOTIATION_FAILED",
            Self::ChunkTransfer { source, .. } if source.is_network() => "NETWORK_ERROR",
            Self::ChunkTransfer { .. } => "CHUNK_TRANSFER_FAILED",
            Self::Finalize(e) if e.is_network() => "NETWORK_ERROR",
            Self::Finalize(_) => "FINALIZE_FAILED",
            Self::SubmitFailed(e) if e.is_network() => "NETWORK_ERROR",
            Self::SubmitFailed(_) => "SUBMIT_FAILED",
            Self::CoverFailed(e) if e.is_network() => "NETWORK_ERROR",
            Self::CoverFailed(_) => "COVER_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extension_is_case_insensitive() {
        assert!(is_video_file("demo.mp4"));
        assert!(is_video_file("DEMO.MKV"));
        assert!(is_video_file("holiday.final.WebM"));
        assert!(!is_video_file("clip.xyz"));
        assert!(!is_video_file("mp4"));
        assert!(!is_video_file("cover.png"));
    }

    #[test]
    fn test_image_extension() {
        assert!(is_image_file("cover.JPG"));
        assert!(!is_image_file("cover.tiff"));
    }

    #[test]
    fn test_chunk_count_rounds_up() {
        assert_eq!(chunk_count(10_485_760, 4_194_304), 3);
        assert_eq!(chunk_count(8_388_608, 4_194_304), 2);
        assert_eq!(chunk_count(1, 4_194_304), 1);
        assert_eq!(chunk_count(0, 4_194_304), 0);
        assert_eq!(chunk_count(10, 0), 0);
    }

    #[test]
    fn test_chunk_count_derived_when_platform_omits_it() {
        let negotiated = NegotiateResult {
            upload_id: "up-1".to_string(),
            biz_id: 1,
            endpoint: "https://upos.example".to_string(),
            chunk_size: 4_194_304,
            chunks: 0,
            auth: "tok".to_string(),
            upos_uri: String::new(),
        };

        let session = UploadSession::from_negotiation(negotiated, "demo.mp4", 10_485_760, Utc::now());
        assert_eq!(session.expected_chunk_count, 3);
        assert_eq!(session.state, SessionState::Initialized);
    }

    #[test]
    fn test_network_failures_share_a_code() {
        let err = UploadError::Finalize(RemoteError::Network("timed out".to_string()));
        assert_eq!(err.code(), "NETWORK_ERROR");

        let err = UploadError::Finalize(RemoteError::Rejected {
            code: 21001,
            message: "bad md5".to_string(),
        });
        assert_eq!(err.code(), "FINALIZE_FAILED");
        assert!(err.to_string().contains("bad md5"));
    }
}
