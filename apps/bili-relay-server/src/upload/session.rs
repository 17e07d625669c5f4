//! Upload Session Manager
//!
//! Owns the session lifecycle:
//! - `init_upload`: validate, negotiate with the platform, store the session
//! - `upload_chunk`: look up the session and forward one chunk
//! - `complete_upload`: finalize on the platform and retire the session
//!
//! All state lives in the [`SessionStore`]. Remote calls are made with no
//! store lock held, so a slow platform never blocks other sessions.

use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::store::SessionStore;
use super::types::{
    is_image_file, is_video_file, ChunkUpload, CompleteUpload, SessionHandle, SessionSnapshot,
    SessionState, UploadError, UploadSession,
};
use crate::config::{UploadConfig, MAX_SESSION_TTL_SECS};
use crate::remote::{
    ChunkAck, ChunkTransfer, CoverResult, FinalizeRequest, FinalizeResult, RemoteUploadClient,
    SubmitRequest, SubmitResult,
};

// ============================================================================
// Session Manager
// ============================================================================

/// Floor for the reaper interval; `tokio::time::interval` rejects zero
const MIN_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);

/// Manages upload sessions
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    store: SessionStore,
    remote: Arc<dyn RemoteUploadClient>,

    /// Age after which the reaper removes a session
    session_ttl: chrono::Duration,

    /// Reset `created_at` after each successful chunk
    renew_on_chunk: bool,
}

impl SessionManager {
    pub fn new(store: SessionStore, remote: Arc<dyn RemoteUploadClient>, config: &UploadConfig) -> Self {
        let ttl_secs = config.session_ttl_secs.clamp(1, MAX_SESSION_TTL_SECS);
        if ttl_secs != config.session_ttl_secs {
            tracing::warn!(
                configured = config.session_ttl_secs,
                effective = ttl_secs,
                "Session TTL out of range, clamped"
            );
        }
        let session_ttl = chrono::Duration::seconds(ttl_secs as i64);

        Self {
            inner: Arc::new(SessionManagerInner {
                store,
                remote,
                session_ttl,
                renew_on_chunk: config.renew_on_chunk,
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        self.inner.session_ttl
    }

    /// Whether the platform client carries credentials
    pub fn is_authenticated(&self) -> bool {
        self.inner.remote.is_authenticated()
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Negotiate a new upload and store its session
    pub async fn init_upload(&self, filename: &str, filesize: u64) -> Result<SessionHandle, UploadError> {
        if filename.trim().is_empty() {
            return Err(UploadError::Validation("filename is required".to_string()));
        }
        if !is_video_file(filename) {
            return Err(UploadError::UnsupportedFormat(filename.to_string()));
        }
        if filesize == 0 {
            return Err(UploadError::Validation("filesize must be greater than 0".to_string()));
        }

        let negotiated = self
            .inner
            .remote
            .negotiate(filename, filesize)
            .await
            .map_err(|e| {
                tracing::warn!(filename = %filename, error = %e, "Pre-upload negotiation failed");
                UploadError::NegotiationFailed(e)
            })?;

        let session = UploadSession::from_negotiation(negotiated, filename, filesize, Utc::now());
        let handle = session.handle();

        self.inner.store.put(session).await?;

        tracing::info!(
            session_id = %handle.upload_id,
            filename = %filename,
            filesize = filesize,
            chunk_size = handle.chunk_size,
            chunks = handle.chunks,
            "Created upload session"
        );

        Ok(handle)
    }

    /// Forward one chunk for an existing session.
    ///
    /// Chunks may arrive in any order; the platform is the system of record
    /// for completeness. A failed transfer leaves the session untouched.
    pub async fn upload_chunk(&self, session_id: &str, chunk: ChunkUpload) -> Result<ChunkAck, UploadError> {
        let session = self.inner.store.get(session_id).await?;
        validate_chunk(&session, &chunk)?;

        let chunk_index = chunk.chunk_index;
        let auth = if chunk.auth.is_empty() {
            session.auth_token.clone()
        } else {
            chunk.auth
        };

        let transfer = ChunkTransfer {
            endpoint: session.endpoint.clone(),
            upload_id: session.session_id.clone(),
            biz_id: session.biz_id,
            chunk_index,
            total_chunks: chunk.total_chunks,
            payload: chunk.payload,
            md5: chunk.md5,
            crc32: chunk.crc32,
            hash: chunk.hash,
            auth,
        };

        let ack = self
            .inner
            .remote
            .transfer_chunk(transfer)
            .await
            .map_err(|e| {
                tracing::warn!(
                    session_id = %session_id,
                    chunk_index = chunk_index,
                    error = %e,
                    "Chunk transfer failed"
                );
                UploadError::ChunkTransfer {
                    chunk_index,
                    source: e,
                }
            })?;

        let renew = self.inner.renew_on_chunk;
        let updated = self
            .inner
            .store
            .update(session_id, |s| {
                s.received_chunks.insert(chunk_index);
                if renew {
                    s.created_at = Utc::now();
                }
            })
            .await;

        match updated {
            Some(s) => tracing::debug!(
                session_id = %session_id,
                chunk_index = chunk_index,
                received = s.received_chunks.len(),
                expected = s.expected_chunk_count,
                "Chunk forwarded"
            ),
            None => tracing::debug!(
                session_id = %session_id,
                chunk_index = chunk_index,
                "Chunk forwarded after session was retired"
            ),
        }

        Ok(ack)
    }

    /// Finalize the upload on the platform and retire the session.
    ///
    /// Only one finalize per session may be in flight; a concurrent caller
    /// gets `FinalizeInProgress`. On failure the claim is released and the
    /// session stays so the client can retry.
    pub async fn complete_upload(
        &self,
        session_id: &str,
        request: CompleteUpload,
    ) -> Result<FinalizeResult, UploadError> {
        self.inner.store.get(session_id).await?;

        for (name, value) in [("md5", &request.md5), ("crc32", &request.crc32), ("hash", &request.hash)] {
            if value.is_empty() {
                return Err(UploadError::Validation(format!("{} is required", name)));
            }
        }

        let session = self.inner.store.claim_finalize(session_id).await?;

        let finalize = FinalizeRequest {
            endpoint: session.endpoint.clone(),
            upload_id: session.session_id.clone(),
            biz_id: session.biz_id,
            filename: if request.filename.is_empty() {
                session.filename.clone()
            } else {
                request.filename
            },
            filesize: if request.filesize == 0 {
                session.total_size
            } else {
                request.filesize
            },
            md5: request.md5,
            crc32: request.crc32,
            hash: request.hash,
            auth: if request.auth.is_empty() {
                session.auth_token.clone()
            } else {
                request.auth
            },
        };

        let result = match self.inner.remote.finalize(finalize).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Finalize failed");
                self.inner.store.release_finalize(session_id).await;
                return Err(UploadError::Finalize(e));
            }
        };

        if self.inner.store.delete(session_id).await.is_none() {
            tracing::warn!(
                session_id = %session_id,
                "Session reaped while finalize was in flight"
            );
        }

        tracing::info!(
            session_id = %session_id,
            filename = %session.filename,
            upos_uri = %result.upos_uri,
            state = ?SessionState::Completed,
            "Upload session completed"
        );

        Ok(result)
    }

    /// Current snapshot of a live session
    pub async fn status(&self, session_id: &str) -> Result<SessionSnapshot, UploadError> {
        let session = self.inner.store.get(session_id).await?;
        Ok(SessionSnapshot::new(session, self.inner.session_ttl))
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Publish an assembled object with its video metadata
    pub async fn submit_metadata(&self, request: &SubmitRequest) -> Result<SubmitResult, UploadError> {
        validate_submit(request)?;

        let result = self
            .inner
            .remote
            .submit_metadata(request)
            .await
            .map_err(|e| {
                tracing::warn!(upos_uri = %request.upos_uri, error = %e, "Submit failed");
                UploadError::SubmitFailed(e)
            })?;

        tracing::info!(
            bvid = %result.bvid,
            aid = result.aid,
            title = %request.title,
            "Video submitted"
        );

        Ok(result)
    }

    /// Upload a cover image, returning its platform URL
    pub async fn upload_cover(&self, filename: &str, data: &[u8]) -> Result<CoverResult, UploadError> {
        if !is_image_file(filename) {
            return Err(UploadError::Validation(format!(
                "unsupported cover image: {}",
                filename
            )));
        }
        if data.is_empty() {
            return Err(UploadError::Validation("cover image is empty".to_string()));
        }

        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        let data_uri = format!(
            "data:{};base64,{}",
            mime.essence_str(),
            base64::engine::general_purpose::STANDARD.encode(data)
        );

        self.inner
            .remote
            .upload_cover(&data_uri)
            .await
            .map_err(UploadError::CoverFailed)
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Remove sessions older than the TTL
    ///
    /// Returns the number of sessions cleaned up
    pub async fn cleanup_expired(&self) -> usize {
        let count = self
            .inner
            .store
            .sweep(Utc::now(), self.inner.session_ttl)
            .await;

        if count > 0 {
            tracing::info!(count = count, "Cleaned up expired upload sessions");
        }

        count
    }

    /// Start background cleanup task
    ///
    /// Sweeps every `interval` until `cancel` fires.
    pub fn start_cleanup_task(
        self,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        if interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(
                interval_ms = interval.as_millis(),
                "Sweep interval too small, using {}ms",
                MIN_SWEEP_INTERVAL.as_millis()
            );
        }
        let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session cleanup task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.cleanup_expired().await;
                    }
                }
            }
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_chunk(session: &UploadSession, chunk: &ChunkUpload) -> Result<(), UploadError> {
    if chunk.total_chunks == 0 {
        return Err(UploadError::Validation("total_chunks must be greater than 0".to_string()));
    }
    if chunk.chunk_index >= chunk.total_chunks {
        return Err(UploadError::Validation(format!(
            "chunk_index {} out of range for {} chunks",
            chunk.chunk_index, chunk.total_chunks
        )));
    }
    if session.expected_chunk_count > 0 && chunk.total_chunks != session.expected_chunk_count {
        return Err(UploadError::Validation(format!(
            "total_chunks {} does not match negotiated {}",
            chunk.total_chunks, session.expected_chunk_count
        )));
    }
    if chunk.payload.is_empty() {
        return Err(UploadError::Validation("chunk payload is empty".to_string()));
    }
    if chunk.payload.len() as u64 > session.chunk_size {
        return Err(UploadError::Validation(format!(
            "chunk of {} bytes exceeds negotiated chunk_size {}",
            chunk.payload.len(),
            session.chunk_size
        )));
    }
    for (name, value) in [("md5", &chunk.md5), ("crc32", &chunk.crc32), ("hash", &chunk.hash)] {
        if value.is_empty() {
            return Err(UploadError::Validation(format!("{} is required", name)));
        }
    }
    Ok(())
}

fn validate_submit(request: &SubmitRequest) -> Result<(), UploadError> {
    if request.upos_uri.is_empty() {
        return Err(UploadError::Validation("upos_uri is required".to_string()));
    }
    if request.title.trim().is_empty() {
        return Err(UploadError::Validation("title is required".to_string()));
    }
    if request.tid == 0 {
        return Err(UploadError::Validation("tid is required".to_string()));
    }
    match request.copyright {
        1 => Ok(()),
        2 if request.source.trim().is_empty() => Err(UploadError::Validation(
            "source is required for reposts".to_string(),
        )),
        2 => Ok(()),
        other => Err(UploadError::Validation(format!(
            "copyright must be 1 or 2, got {}",
            other
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
