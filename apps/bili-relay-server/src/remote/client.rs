//! Remote client trait

use async_trait::async_trait;

use super::types::{
    ChunkAck, ChunkTransfer, CoverResult, FinalizeRequest, FinalizeResult, NegotiateResult,
    RemoteError, SubmitRequest, SubmitResult,
};

/// Operations the relay performs against the video platform.
///
/// Every call is a single attempt. Retrying is left to whoever drives the
/// upload.
#[async_trait]
pub trait RemoteUploadClient: Send + Sync {
    /// Negotiate upload parameters (endpoint, chunk size, auth token)
    async fn negotiate(&self, filename: &str, filesize: u64) -> Result<NegotiateResult, RemoteError>;

    /// Transfer one chunk to the negotiated endpoint
    async fn transfer_chunk(&self, chunk: ChunkTransfer) -> Result<ChunkAck, RemoteError>;

    /// Ask the platform to assemble all transferred chunks
    async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizeResult, RemoteError>;

    /// Publish an assembled object as a video
    async fn submit_metadata(&self, request: &SubmitRequest) -> Result<SubmitResult, RemoteError>;

    /// Upload a cover image given as a `data:` URI
    async fn upload_cover(&self, data_uri: &str) -> Result<CoverResult, RemoteError>;

    /// Whether platform credentials are configured
    fn is_authenticated(&self) -> bool;
}
