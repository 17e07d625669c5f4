//! Test doubles shared by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::sync::Notify;

use crate::config::Config;
use crate::remote::{
    ChunkAck, ChunkTransfer, CoverResult, FinalizeRequest, FinalizeResult, NegotiateResult,
    RemoteError, RemoteUploadClient, SubmitRequest, SubmitResult,
};

use crate::state::AppState;

pub const CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// In-process stand-in for the platform with call counters and scripted failures
#[derive(Default)]
pub struct MockRemote {
    pub negotiate_calls: AtomicUsize,
    pub chunk_calls: AtomicUsize,
    pub finalize_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub cover_calls: AtomicUsize,

    negotiate_failures: Mutex<VecDeque<RemoteError>>,
    chunk_failures: Mutex<VecDeque<RemoteError>>,
    finalize_failures: Mutex<VecDeque<RemoteError>>,
    submit_failures: Mutex<VecDeque<RemoteError>>,

    /// (upload_id, chunk_index, payload length) per accepted chunk
    pub transferred: Mutex<Vec<(String, u32, usize)>>,
    pub finalized: Mutex<Vec<FinalizeRequest>>,
    pub submitted: Mutex<Vec<SubmitRequest>>,

    /// Artificial latency on every call
    pub latency: Option<Duration>,

    /// When set, `finalize` waits for a notification before answering
    pub finalize_gate: Option<Arc<Notify>>,

    /// Chunk count reported by negotiation instead of the real one
    pub reported_chunks: Option<u32>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn with_finalize_gate(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            finalize_gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn with_reported_chunks(chunks: u32) -> Arc<Self> {
        Arc::new(Self {
            reported_chunks: Some(chunks),
            ..Self::default()
        })
    }

    pub fn fail_next_negotiate(&self, err: RemoteError) {
        self.negotiate_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_chunk(&self, err: RemoteError) {
        self.chunk_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_finalize(&self, err: RemoteError) {
        self.finalize_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_submit(&self, err: RemoteError) {
        self.submit_failures.lock().unwrap().push_back(err);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn scripted(queue: &Mutex<VecDeque<RemoteError>>) -> Result<(), RemoteError> {
        match queue.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn rejected(message: &str) -> RemoteError {
    RemoteError::Rejected {
        code: -1,
        message: message.to_string(),
    }
}

#[async_trait]
impl RemoteUploadClient for MockRemote {
    async fn negotiate(&self, filename: &str, filesize: u64) -> Result<NegotiateResult, RemoteError> {
        let n = self.negotiate_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        Self::scripted(&self.negotiate_failures)?;

        Ok(NegotiateResult {
            upload_id: format!("upload-{}", n + 1),
            biz_id: 1000 + n as i64,
            endpoint: format!("https://upos.example/ugc/{}", filename),
            chunk_size: CHUNK_SIZE,
            chunks: self
                .reported_chunks
                .unwrap_or_else(|| u32::try_from(filesize.div_ceil(CHUNK_SIZE)).unwrap()),
            auth: format!("auth-{}", n + 1),
            upos_uri: format!("upos://ugc/{}", filename),
        })
    }

    async fn transfer_chunk(&self, chunk: ChunkTransfer) -> Result<ChunkAck, RemoteError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        Self::scripted(&self.chunk_failures)?;

        self.transferred.lock().unwrap().push((
            chunk.upload_id.clone(),
            chunk.chunk_index,
            chunk.payload.len(),
        ));
        Ok(ChunkAck {
            chunk_index: chunk.chunk_index,
        })
    }

    async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizeResult, RemoteError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(gate) = &self.finalize_gate {
            gate.notified().await;
        }
        Self::scripted(&self.finalize_failures)?;

        let upos_uri = format!("upos://ugc/{}-{}", request.upload_id, request.filename);
        self.finalized.lock().unwrap().push(request);
        Ok(FinalizeResult { upos_uri })
    }

    async fn submit_metadata(&self, request: &SubmitRequest) -> Result<SubmitResult, RemoteError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        Self::scripted(&self.submit_failures)?;

        self.submitted.lock().unwrap().push(request.clone());
        Ok(SubmitResult {
            aid: 170_000 + n as i64,
            bvid: format!("BV1mock{:05}", n),
        })
    }

    async fn upload_cover(&self, data_uri: &str) -> Result<CoverResult, RemoteError> {
        self.cover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CoverResult {
            url: format!("https://i0.hdslb.example/cover/{}.jpg", data_uri.len()),
        })
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

// ============================================================================
// HTTP helpers
// ============================================================================

const BOUNDARY: &str = "relay-test-boundary";

/// Full gateway router backed by `remote`
pub fn app(remote: Arc<MockRemote>) -> Router {
    app_with_config(remote, Config::default())
}

pub fn app_with_config(remote: Arc<MockRemote>, config: Config) -> Router {
    crate::routes::app(AppState::new(config, remote))
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// multipart/form-data request with text fields and an optional
/// `(field, filename, bytes)` file part
pub fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn read_json(response: Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
