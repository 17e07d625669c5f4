//! Session Store
//!
//! Thread-safe `session_id -> UploadSession` table. Reads run in parallel;
//! writers hold the lock only for a single map mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::{SessionState, UploadError, UploadSession};

/// In-memory session table
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    /// Live sessions indexed by id
    sessions: HashMap<String, UploadSession>,

    /// Ids that were removed; they may never be reused
    retired: HashSet<String>,
}

impl StoreInner {
    fn retire(&mut self, session_id: &str) -> Option<UploadSession> {
        let removed = self.sessions.remove(session_id);
        if removed.is_some() {
            self.retired.insert(session_id.to_string());
        }
        removed
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session, refusing live or retired ids
    pub async fn put(&self, session: UploadSession) -> Result<(), UploadError> {
        let mut inner = self.inner.write().await;

        if inner.sessions.contains_key(&session.session_id)
            || inner.retired.contains(&session.session_id)
        {
            return Err(UploadError::DuplicateSession(session.session_id));
        }

        inner.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    /// Get a copy of a session
    pub async fn get(&self, session_id: &str) -> Result<UploadSession, UploadError> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))
    }

    /// Remove a session; absent ids are not an error
    pub async fn delete(&self, session_id: &str) -> Option<UploadSession> {
        let mut inner = self.inner.write().await;
        inner.retire(session_id)
    }

    /// Apply `f` to a live session in place.
    ///
    /// Returns `None` when the session is gone; callers treat that as a
    /// no-op since completion or expiry already won the race.
    pub async fn update<F>(&self, session_id: &str, f: F) -> Option<UploadSession>
    where
        F: FnOnce(&mut UploadSession),
    {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.get_mut(session_id)?;
        f(session);
        Some(session.clone())
    }

    /// Claim a session for finalization.
    ///
    /// Check-and-set under the write lock: the first caller gets a copy of
    /// the session, later callers get `FinalizeInProgress` until the claim
    /// is released or the session is retired.
    pub async fn claim_finalize(&self, session_id: &str) -> Result<UploadSession, UploadError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))?;

        if session.finalizing {
            return Err(UploadError::FinalizeInProgress(session_id.to_string()));
        }
        session.finalizing = true;
        Ok(session.clone())
    }

    /// Drop a finalize claim so the client can retry
    pub async fn release_finalize(&self, session_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.finalizing = false;
        }
    }

    /// Remove every session created more than `max_age` before `now`.
    ///
    /// Returns the number removed.
    pub async fn sweep(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> usize {
        let mut inner = self.inner.write().await;

        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.is_expired_at(now, max_age))
            .map(|s| s.session_id.clone())
            .collect();

        for id in &expired {
            if let Some(mut session) = inner.retire(id) {
                session.state = SessionState::Expired;
                tracing::debug!(
                    session_id = %id,
                    filename = %session.filename,
                    state = ?session.state,
                    "Reaped upload session"
                );
            }
        }

        expired.len()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::NegotiateResult;
    use chrono::Duration;

    fn session_at(id: &str, created_at: DateTime<Utc>) -> UploadSession {
        let negotiated = NegotiateResult {
            upload_id: id.to_string(),
            biz_id: 7,
            endpoint: "https://upos.example/ugc/demo.mp4".to_string(),
            chunk_size: 4_194_304,
            chunks: 3,
            auth: "tok".to_string(),
            upos_uri: "upos://ugc/demo.mp4".to_string(),
        };
        UploadSession::from_negotiation(negotiated, "demo.mp4", 10_485_760, created_at)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = SessionStore::new();
        let session = session_at("a", Utc::now());

        store.put(session.clone()).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), session);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_duplicate_rejected() {
        let store = SessionStore::new();
        store.put(session_at("a", Utc::now())).await.unwrap();

        let result = store.put(session_at("a", Utc::now())).await;
        assert!(matches!(result, Err(UploadError::DuplicateSession(id)) if id == "a"));
    }

    #[tokio::test]
    async fn test_removed_id_cannot_be_reused() {
        let store = SessionStore::new();
        store.put(session_at("a", Utc::now())).await.unwrap();
        store.delete("a").await;

        assert!(matches!(store.get("a").await, Err(UploadError::SessionNotFound(_))));
        assert!(matches!(
            store.put(session_at("a", Utc::now())).await,
            Err(UploadError::DuplicateSession(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = SessionStore::new();
        assert!(store.delete("missing").await.is_none());

        store.put(session_at("a", Utc::now())).await.unwrap();
        assert!(store.delete("a").await.is_some());
        assert!(store.delete("a").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_respects_max_age() {
        let store = SessionStore::new();
        let t0 = Utc::now();
        store.put(session_at("a", t0)).await.unwrap();

        let removed = store.sweep(t0 + Duration::minutes(59), Duration::minutes(60)).await;
        assert_eq!(removed, 0);
        assert!(store.get("a").await.is_ok());

        let removed = store.sweep(t0 + Duration::minutes(61), Duration::minutes(60)).await;
        assert_eq!(removed, 1);
        assert!(matches!(store.get("a").await, Err(UploadError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_only_removes_old_sessions() {
        let store = SessionStore::new();
        let t0 = Utc::now();
        store.put(session_at("old", t0)).await.unwrap();
        store.put(session_at("new", t0 + Duration::minutes(30))).await.unwrap();

        let removed = store.sweep(t0 + Duration::minutes(61), Duration::minutes(60)).await;

        assert_eq!(removed, 1);
        assert!(store.get("old").await.is_err());
        assert!(store.get("new").await.is_ok());
    }

    #[tokio::test]
    async fn test_finalize_claim_is_exclusive() {
        let store = SessionStore::new();
        store.put(session_at("a", Utc::now())).await.unwrap();

        let claimed = store.claim_finalize("a").await.unwrap();
        assert!(claimed.finalizing);
        assert!(matches!(
            store.claim_finalize("a").await,
            Err(UploadError::FinalizeInProgress(_))
        ));

        store.release_finalize("a").await;
        assert!(store.claim_finalize("a").await.is_ok());

        assert!(matches!(
            store.claim_finalize("missing").await,
            Err(UploadError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_session_is_noop() {
        let store = SessionStore::new();
        let updated = store
            .update("missing", |s| {
                s.received_chunks.insert(0);
            })
            .await;
        assert!(updated.is_none());
        assert!(store.is_empty().await);
    }
}
