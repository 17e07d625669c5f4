//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::publish::Publisher;
use crate::remote::RemoteUploadClient;
use crate::transcode::Transcoder;
use crate::upload::{SessionManager, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    sessions: SessionManager,
    publisher: Publisher,
    transcoder: Transcoder,
}

impl AppState {
    /// Wire the session store, manager and helpers around a platform client
    pub fn new(config: Config, remote: Arc<dyn RemoteUploadClient>) -> Self {
        let sessions = SessionManager::new(SessionStore::new(), remote, &config.upload);
        let publisher = Publisher::new(sessions.clone(), config.upload.temp_dir.clone());
        let transcoder = Transcoder::new(&config.transcode);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                sessions,
                publisher,
                transcoder,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload session manager
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn publisher(&self) -> &Publisher {
        &self.inner.publisher
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.inner.transcoder
    }
}
