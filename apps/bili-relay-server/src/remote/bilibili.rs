//! Bilibili Client
//!
//! `reqwest` implementation of [`RemoteUploadClient`] speaking the UPOS
//! pre-upload / chunk / finalize protocol and the member-site submit API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::{DeserializeOwned, IgnoredAny};

use super::client::RemoteUploadClient;
use super::types::{
    ChunkAck, ChunkTransfer, CoverResult, Envelope, FinalizeData, FinalizeRequest,
    FinalizeResult, NegotiateResult, PreuploadData, RemoteError, SubmitRequest, SubmitResult,
};
use crate::config::BilibiliConfig;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const MEMBER_ORIGIN: &str = "https://member.bilibili.com";
const PREUPLOAD_PROTOCOL_VERSION: &str = "20221109";
const UPLOAD_ZONE: &str = "sh001";

/// Platform credentials injected into every outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformAuth {
    /// Browser session cookies; `bili_jct` doubles as the CSRF token
    Cookie { sessdata: String, bili_jct: String },
    /// OAuth access token
    Bearer { token: String },
    Anonymous,
}

impl PlatformAuth {
    fn csrf(&self) -> &str {
        match self {
            Self::Cookie { bili_jct, .. } => bili_jct,
            _ => "",
        }
    }
}

/// HTTP client for the bilibili upload endpoints
pub struct BilibiliClient {
    http: reqwest::Client,
    base_url: String,
    auth: PlatformAuth,
    profile: String,
    upcdn: String,
}

impl BilibiliClient {
    pub fn new(config: &BilibiliConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            profile: config.profile.clone(),
            upcdn: config.upcdn.clone(),
        })
    }

    /// Attach referer, origin and credentials
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(reqwest::header::REFERER, format!("{}/", MEMBER_ORIGIN))
            .header(reqwest::header::ORIGIN, MEMBER_ORIGIN);

        match &self.auth {
            PlatformAuth::Cookie { sessdata, bili_jct } => request.header(
                reqwest::header::COOKIE,
                format!("SESSDATA={}; bili_jct={}", sessdata, bili_jct),
            ),
            PlatformAuth::Bearer { token } => request.bearer_auth(token),
            PlatformAuth::Anonymous => request,
        }
    }

    /// Read a response body and unwrap its envelope
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, RemoteError> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(RemoteError::Rejected {
                code: i64::from(status.as_u16()),
                message: truncate(&body, 200),
            }),
            Err(e) => Err(RemoteError::Decode(format!(
                "{} (body: {})",
                e,
                truncate(&body, 200)
            ))),
        }
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request.send().await?;
        Self::read_envelope::<T>(response).await?.into_data()
    }
}

#[async_trait]
impl RemoteUploadClient for BilibiliClient {
    async fn negotiate(&self, filename: &str, filesize: u64) -> Result<NegotiateResult, RemoteError> {
        let url = format!("{}/preupload", self.base_url);
        let query: Vec<(&str, String)> = vec![
            ("name", filename.to_string()),
            ("size", filesize.to_string()),
            ("r", "upos".to_string()),
            ("profile", self.profile.clone()),
            ("probe_version", PREUPLOAD_PROTOCOL_VERSION.to_string()),
            ("upcdn", self.upcdn.clone()),
            ("zone", UPLOAD_ZONE.to_string()),
        ];

        let data: PreuploadData = Self::send(self.authorize(self.http.get(&url).query(&query))).await?;
        let result = NegotiateResult::try_from(data)?;

        tracing::debug!(
            upload_id = %result.upload_id,
            endpoint = %result.endpoint,
            chunk_size = result.chunk_size,
            "Pre-upload negotiated"
        );

        Ok(result)
    }

    async fn transfer_chunk(&self, chunk: ChunkTransfer) -> Result<ChunkAck, RemoteError> {
        let size = chunk.payload.len().to_string();
        let query: Vec<(&str, String)> = vec![
            ("output", "json".to_string()),
            ("profile", self.profile.clone()),
            ("upload_id", chunk.upload_id.clone()),
            ("biz_id", chunk.biz_id.to_string()),
            ("upcdn", self.upcdn.clone()),
            ("chunk", chunk.chunk_index.to_string()),
            ("chunks", chunk.total_chunks.to_string()),
            ("size", size.clone()),
            ("total", size),
            ("md5", chunk.md5.clone()),
            ("crc32", chunk.crc32.clone()),
            ("hash", chunk.hash.clone()),
            ("auth", chunk.auth.clone()),
        ];

        let request = self
            .http
            .put(&chunk.endpoint)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk.payload);

        // The chunk response carries no payload worth keeping
        let response = self.authorize(request).send().await?;
        let envelope = Self::read_envelope::<IgnoredAny>(response).await?;
        if envelope.code != 0 {
            return Err(RemoteError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(ChunkAck {
            chunk_index: chunk.chunk_index,
        })
    }

    async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizeResult, RemoteError> {
        let query: Vec<(&str, String)> = vec![
            ("output", "json".to_string()),
            ("profile", self.profile.clone()),
            ("upload_id", request.upload_id),
            ("biz_id", request.biz_id.to_string()),
            ("upcdn", self.upcdn.clone()),
            ("file_size", request.filesize.to_string()),
            ("file_name", request.filename),
            ("file_md5", request.md5),
            ("file_crc32", request.crc32),
            ("file_hash", request.hash),
            ("auth", request.auth),
        ];

        let data: FinalizeData =
            Self::send(self.authorize(self.http.post(&request.endpoint).query(&query))).await?;
        FinalizeResult::try_from(data)
    }

    async fn submit_metadata(&self, request: &SubmitRequest) -> Result<SubmitResult, RemoteError> {
        let url = format!("{}/x/vu/web/add", self.base_url);

        let videos = serde_json::json!([{
            "filename": request.upos_uri,
            "title": request.title,
            "desc": request.desc,
        }]);

        let mut form: Vec<(&str, String)> = vec![
            ("csrf", self.auth.csrf().to_string()),
            ("copyright", request.copyright.to_string()),
            ("tid", request.tid.to_string()),
            ("cover", request.cover.clone()),
            ("title", request.title.clone()),
            ("desc", request.desc.clone()),
            ("desc_format_id", "0".to_string()),
            ("tag", request.tags.clone()),
            ("videos", videos.to_string()),
        ];
        if !request.source.is_empty() {
            form.push(("source", request.source.clone()));
        }

        let result: SubmitResult = Self::send(self.authorize(self.http.post(&url).form(&form))).await?;
        if result.bvid.is_empty() {
            return Err(RemoteError::Decode("submit returned no bvid".to_string()));
        }
        Ok(result)
    }

    async fn upload_cover(&self, data_uri: &str) -> Result<CoverResult, RemoteError> {
        let url = format!("{}/x/vu/web/cover/up", self.base_url);
        let form = [("csrf", self.auth.csrf()), ("cover", data_uri)];

        Self::send(self.authorize(self.http.post(&url).form(&form))).await
    }

    fn is_authenticated(&self) -> bool {
        !matches!(self.auth, PlatformAuth::Anonymous)
    }
}

fn truncate(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
