//! Remote Upload Client
//!
//! Boundary to the video platform. The session manager only ever sees the
//! [`RemoteUploadClient`] trait; [`BilibiliClient`] is the HTTP implementation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bili_relay_server::remote::{BilibiliClient, PlatformAuth};
//!
//! let client = BilibiliClient::new(&config.bilibili)?;
//! let negotiated = client.negotiate("demo.mp4", 10_485_760).await?;
//! ```

mod bilibili;
mod client;
mod types;

pub use bilibili::{BilibiliClient, PlatformAuth};
pub use client::RemoteUploadClient;
pub use types::{
    ChunkAck, ChunkTransfer, CoverResult, Envelope, FinalizeData, FinalizeRequest,
    FinalizeResult, NegotiateResult, PreuploadData, RemoteError, SubmitRequest, SubmitResult,
};
