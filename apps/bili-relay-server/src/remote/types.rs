//! Remote Upload Types
//!
//! Typed requests and results for the four platform calls, plus the
//! `{code, message, data}` envelope every platform response is wrapped in.

use serde::{Deserialize, Serialize};

// ============================================================================
// Errors
// ============================================================================

/// Classified failure of a single remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The platform could not be reached or the transfer broke off
    #[error("network error: {0}")]
    Network(String),

    /// The platform answered with a non-zero envelope code
    #[error("remote rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The platform answered with something we could not decode
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Human-readable reason, as given by the platform when it gave one
    pub fn message(&self) -> &str {
        match self {
            Self::Network(msg) | Self::Decode(msg) => msg,
            Self::Rejected { message, .. } => message,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Platform response envelope; `code != 0` signals failure
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, turning a non-zero code into `Rejected`
    pub fn into_data(self) -> Result<T, RemoteError> {
        if self.code != 0 {
            return Err(RemoteError::Rejected {
                code: self.code,
                message: self.message,
            });
        }
        self.data
            .ok_or_else(|| RemoteError::Decode("response envelope has no data".to_string()))
    }
}

// ============================================================================
// Negotiate
// ============================================================================

/// Raw pre-upload payload as the platform sends it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreuploadData {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub biz_id: i64,
    #[serde(default)]
    pub upos_uri: String,
    #[serde(default)]
    pub chunk_size: u64,
    #[serde(default)]
    pub chunks: u32,
    #[serde(default)]
    pub upload_id: String,
    #[serde(default)]
    pub auth: String,
}

/// Validated negotiation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiateResult {
    pub upload_id: String,
    pub biz_id: i64,
    pub endpoint: String,
    pub chunk_size: u64,
    /// Chunk count reported by the platform, 0 when it did not say
    pub chunks: u32,
    pub auth: String,
    pub upos_uri: String,
}

impl TryFrom<PreuploadData> for NegotiateResult {
    type Error = RemoteError;

    fn try_from(data: PreuploadData) -> Result<Self, Self::Error> {
        if data.upload_id.is_empty() {
            return Err(RemoteError::Decode("pre-upload returned no upload_id".to_string()));
        }
        if data.endpoint.is_empty() {
            return Err(RemoteError::Decode("pre-upload returned no endpoint".to_string()));
        }
        if data.chunk_size == 0 {
            return Err(RemoteError::Decode("pre-upload returned chunk_size 0".to_string()));
        }

        // Endpoints come back protocol-relative ("//upos-sz-...")
        let endpoint = if data.endpoint.starts_with("//") {
            format!("https:{}", data.endpoint)
        } else {
            data.endpoint
        };

        Ok(Self {
            upload_id: data.upload_id,
            biz_id: data.biz_id,
            endpoint,
            chunk_size: data.chunk_size,
            chunks: data.chunks,
            auth: data.auth,
            upos_uri: data.upos_uri,
        })
    }
}

// ============================================================================
// Chunk transfer
// ============================================================================

/// One chunk on its way to the platform
#[derive(Debug, Clone)]
pub struct ChunkTransfer {
    pub endpoint: String,
    pub upload_id: String,
    pub biz_id: i64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub payload: bytes::Bytes,
    pub md5: String,
    pub crc32: String,
    pub hash: String,
    pub auth: String,
}

/// Acknowledgement of a chunk; the platform only says "ok"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    pub chunk_index: u32,
}

// ============================================================================
// Finalize
// ============================================================================

/// Request to assemble the uploaded chunks into one object
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub endpoint: String,
    pub upload_id: String,
    pub biz_id: i64,
    pub filename: String,
    pub filesize: u64,
    pub md5: String,
    pub crc32: String,
    pub hash: String,
    pub auth: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeData {
    #[serde(default)]
    pub upos_uri: String,
}

/// Reference to the assembled remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizeResult {
    pub upos_uri: String,
}

impl TryFrom<FinalizeData> for FinalizeResult {
    type Error = RemoteError;

    fn try_from(data: FinalizeData) -> Result<Self, Self::Error> {
        if data.upos_uri.is_empty() {
            return Err(RemoteError::Decode("finalize returned no upos_uri".to_string()));
        }
        Ok(Self { upos_uri: data.upos_uri })
    }
}

// ============================================================================
// Submit
// ============================================================================

/// Publish metadata for an uploaded video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub upos_uri: String,
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub tags: String,
    /// Category (partition) id
    pub tid: u32,
    #[serde(default)]
    pub cover: String,
    /// 1 = original work, 2 = repost
    pub copyright: u8,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    #[serde(default)]
    pub aid: i64,
    pub bvid: String,
}

// ============================================================================
// Cover
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverResult {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_nonzero_code_is_rejection() {
        let env: Envelope<PreuploadData> =
            serde_json::from_str(r#"{"code":-101,"message":"账号未登录","data":null}"#).unwrap();

        let err = env.into_data().unwrap_err();
        assert_eq!(
            err,
            RemoteError::Rejected {
                code: -101,
                message: "账号未登录".to_string()
            }
        );
        assert_eq!(err.message(), "账号未登录");
    }

    #[test]
    fn test_envelope_missing_data_is_decode_error() {
        let env: Envelope<FinalizeData> = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert!(matches!(env.into_data(), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn test_negotiate_normalizes_protocol_relative_endpoint() {
        let data = PreuploadData {
            endpoint: "//upos-sz-upcdntx.bilivideo.com".to_string(),
            upload_id: "u1".to_string(),
            chunk_size: 4 * 1024 * 1024,
            ..Default::default()
        };

        let result = NegotiateResult::try_from(data).unwrap();
        assert_eq!(result.endpoint, "https://upos-sz-upcdntx.bilivideo.com");
    }

    #[test]
    fn test_negotiate_rejects_zero_chunk_size() {
        let data = PreuploadData {
            endpoint: "https://upos.example".to_string(),
            upload_id: "u1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            NegotiateResult::try_from(data),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn test_finalize_requires_uri() {
        assert!(FinalizeResult::try_from(FinalizeData::default()).is_err());
    }
}
