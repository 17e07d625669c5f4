//! One-click publishing
//!
//! Drives a locally spooled video through the whole relay pipeline:
//! init, every chunk with its integrity tokens, complete, then submit.
//! The spooled file is removed afterwards whatever the outcome.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::remote::SubmitRequest;
use crate::upload::{chunk_tokens, ChunkUpload, CompleteUpload, FileDigest, SessionManager, UploadError};

/// Category used when the client sends none or an unparsable one
pub const DEFAULT_TID: u32 = 21;

/// Public watch page for a published video
pub fn video_url(bvid: &str) -> String {
    format!("https://www.bilibili.com/video/{}", bvid)
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Failed to spool upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("File ended after {read} of {expected} chunks")]
    Truncated { read: u32, expected: u32 },

    #[error("File has data past the {expected} negotiated chunks")]
    TrailingData { expected: u32 },
}

/// Video metadata for a one-click publish
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub title: String,
    pub desc: String,
    pub tags: String,
    pub category: String,
    pub cover: String,
}

impl PublishRequest {
    /// Tags arrive space or comma separated; the platform wants commas
    pub fn normalized_tags(&self) -> String {
        self.tags
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn tid(&self) -> u32 {
        self.category
            .trim()
            .parse()
            .ok()
            .filter(|tid| *tid > 0)
            .unwrap_or(DEFAULT_TID)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishResult {
    pub bvid: String,
    pub aid: i64,
    pub url: String,
    pub title: String,
    pub upos_uri: String,
}

/// Runs one-click publishes through the session manager
#[derive(Clone)]
pub struct Publisher {
    manager: SessionManager,
    temp_dir: PathBuf,
}

impl Publisher {
    pub fn new(manager: SessionManager, temp_dir: PathBuf) -> Self {
        Self { manager, temp_dir }
    }

    /// Unique spool path for an incoming upload
    pub async fn spool_path(&self, filename: &str) -> Result<PathBuf, PublishError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let base = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin");
        Ok(self.temp_dir.join(format!("{}_{}", Uuid::new_v4(), base)))
    }

    /// Publish a spooled file, then delete it
    pub async fn publish_spooled(
        &self,
        path: &Path,
        filename: &str,
        request: &PublishRequest,
    ) -> Result<PublishResult, PublishError> {
        let result = self.publish_file(path, filename, request).await;

        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove spooled upload");
        }

        result
    }

    /// Relay a local file and submit it
    pub async fn publish_file(
        &self,
        path: &Path,
        filename: &str,
        request: &PublishRequest,
    ) -> Result<PublishResult, PublishError> {
        let filesize = tokio::fs::metadata(path).await?.len();
        let handle = self.manager.init_upload(filename, filesize).await?;

        tracing::info!(
            session_id = %handle.upload_id,
            filename = %filename,
            chunks = handle.chunks,
            "Publishing video"
        );

        let mut file = tokio::fs::File::open(path).await?;
        let mut digest = FileDigest::new();

        for chunk_index in 0..handle.chunks {
            let mut buf = Vec::with_capacity(handle.chunk_size as usize);
            (&mut file).take(handle.chunk_size).read_to_end(&mut buf).await?;
            if buf.is_empty() {
                return Err(PublishError::Truncated {
                    read: chunk_index,
                    expected: handle.chunks,
                });
            }

            digest.update(&buf);
            let tokens = chunk_tokens(&buf);

            self.manager
                .upload_chunk(
                    &handle.upload_id,
                    ChunkUpload {
                        chunk_index,
                        total_chunks: handle.chunks,
                        payload: Bytes::from(buf),
                        md5: tokens.md5,
                        crc32: tokens.crc32,
                        hash: tokens.hash,
                        auth: handle.auth.clone(),
                    },
                )
                .await?;
        }

        let mut extra = [0u8; 1];
        if file.read(&mut extra).await? != 0 {
            return Err(PublishError::TrailingData {
                expected: handle.chunks,
            });
        }

        let tokens = digest.finalize();
        let finalized = self
            .manager
            .complete_upload(
                &handle.upload_id,
                CompleteUpload {
                    filename: filename.to_string(),
                    filesize,
                    md5: tokens.md5,
                    crc32: tokens.crc32,
                    hash: tokens.hash,
                    auth: handle.auth,
                },
            )
            .await?;

        let submitted = self
            .manager
            .submit_metadata(&SubmitRequest {
                upos_uri: finalized.upos_uri.clone(),
                title: request.title.clone(),
                desc: request.desc.clone(),
                tags: request.normalized_tags(),
                tid: request.tid(),
                cover: request.cover.clone(),
                copyright: 1,
                source: String::new(),
            })
            .await?;

        Ok(PublishResult {
            url: video_url(&submitted.bvid),
            bvid: submitted.bvid,
            aid: submitted.aid,
            title: request.title.clone(),
            upos_uri: finalized.upos_uri,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::test_support::{rejected, MockRemote, CHUNK_SIZE};
    use crate::upload::SessionStore;
    use md5::{Digest, Md5};

    fn request() -> PublishRequest {
        PublishRequest {
            title: "Demo".to_string(),
            desc: "a demo".to_string(),
            tags: "rust  relay,demo".to_string(),
            category: String::new(),
            cover: String::new(),
        }
    }

    fn publisher(remote: std::sync::Arc<MockRemote>, temp_dir: &Path) -> Publisher {
        let manager = SessionManager::new(SessionStore::new(), remote, &UploadConfig::default());
        Publisher::new(manager, temp_dir.to_path_buf())
    }

    #[test]
    fn test_request_normalization() {
        let req = request();
        assert_eq!(req.normalized_tags(), "rust,relay,demo");
        assert_eq!(req.tid(), DEFAULT_TID);

        let req = PublishRequest {
            category: " 17 ".to_string(),
            ..request()
        };
        assert_eq!(req.tid(), 17);
    }

    #[tokio::test]
    async fn test_publish_relays_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockRemote::new();
        let publisher = publisher(remote.clone(), dir.path());

        let content: Vec<u8> = (0..(2 * CHUNK_SIZE + 1024)).map(|i| (i % 251) as u8).collect();
        let path = publisher.spool_path("demo.mp4").await.unwrap();
        tokio::fs::write(&path, &content).await.unwrap();

        let result = publisher
            .publish_spooled(&path, "demo.mp4", &request())
            .await
            .unwrap();

        assert!(result.url.ends_with(&result.bvid));
        assert_eq!(result.title, "Demo");
        assert!(!path.exists());

        let transferred = remote.transferred.lock().unwrap();
        let sizes: Vec<usize> = transferred.iter().map(|(_, _, len)| *len).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE as usize, CHUNK_SIZE as usize, 1024]);

        let finalized = remote.finalized.lock().unwrap();
        assert_eq!(finalized[0].md5, hex::encode(Md5::digest(&content)));
        assert_eq!(finalized[0].filesize, content.len() as u64);

        let submitted = remote.submitted.lock().unwrap();
        assert_eq!(submitted[0].tags, "rust,relay,demo");
        assert_eq!(submitted[0].upos_uri, result.upos_uri);
    }

    #[tokio::test]
    async fn test_failed_publish_still_removes_spool() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockRemote::new();
        remote.fail_next_submit(rejected("title contains banned words"));
        let publisher = publisher(remote.clone(), dir.path());

        let path = publisher.spool_path("demo.mp4").await.unwrap();
        tokio::fs::write(&path, b"tiny video").await.unwrap();

        let err = publisher
            .publish_spooled(&path, "demo.mp4", &request())
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Upload(UploadError::SubmitFailed(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_longer_than_negotiated_chunks_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockRemote::with_reported_chunks(1);
        let publisher = publisher(remote.clone(), dir.path());

        let path = publisher.spool_path("demo.mp4").await.unwrap();
        tokio::fs::write(&path, vec![7u8; CHUNK_SIZE as usize + 10])
            .await
            .unwrap();

        let err = publisher
            .publish_spooled(&path, "demo.mp4", &request())
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::TrailingData { expected: 1 }));
        assert_eq!(MockRemote::calls(&remote.chunk_calls), 1);
        assert_eq!(MockRemote::calls(&remote.finalize_calls), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_spool_path_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = publisher(MockRemote::new(), dir.path());

        let path = publisher.spool_path("../../evil.mp4").await.unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert!(path.to_string_lossy().ends_with("_evil.mp4"));
    }
}
