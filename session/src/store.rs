//! Session CRUD on top of the cache pool.
//!
//! Sessions live in the `session` namespace; a `user_sessions:{user_id}`
//! index tracks the exact set of that user's session ids and is kept in
//! step on create and delete.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cache::{CachePool, Namespace};

use crate::model::Session;

pub struct SessionStore {
    pool: Arc<CachePool>,
}

impl SessionStore {
    pub fn new(pool: Arc<CachePool>) -> Self {
        Self { pool }
    }

    fn index_key(user_id: &str) -> String {
        format!("user_sessions:{user_id}")
    }

    /// Create a fresh session, persist it and append it to the user's
    /// session index.
    #[instrument(skip(self, device_info), target = "session", fields(user_id = %user_id))]
    pub async fn create_session(
        &self,
        user_id: &str,
        device_info: Option<serde_json::Value>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(
            session_id.clone(),
            user_id.to_string(),
            device_info,
            ip_address.map(str::to_string),
            user_agent.map(str::to_string),
            Namespace::Session.default_ttl(),
        );

        self.pool
            .set(&session_id, &session, Namespace::Session, None)
            .await
            .context("failed to persist new session")?;

        self.add_to_index(user_id, &session_id).await?;

        info!(session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// Fetch a session, bumping `last_activity` (and its expiry) as a
    /// side effect of the access.
    #[instrument(skip(self), target = "session")]
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.peek_session(session_id).await? else {
            return Ok(None);
        };

        if !session.is_live(Utc::now()) {
            debug!(session_id, "session found but no longer live");
            return Ok(None);
        }

        session.touch(Namespace::Session.default_ttl());
        self.update_session(session_id, &session).await?;

        Ok(Some(session))
    }

    /// Fetch without the activity bump. Used internally and by read-only
    /// callers (expiry filters, delete).
    pub async fn peek_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.pool.get(session_id, Namespace::Session).await
    }

    pub async fn update_session(&self, session_id: &str, session: &Session) -> Result<()> {
        self.pool
            .set(session_id, session, Namespace::Session, None)
            .await
            .context("failed to persist session update")
    }

    /// Delete the session record and its index entry. The index entry is
    /// removed even when the record itself already expired.
    #[instrument(skip(self), target = "session")]
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let owner = self.peek_session(session_id).await?.map(|s| s.user_id);

        let removed = self.pool.delete(session_id, Namespace::Session).await?;

        match owner {
            Some(user_id) => self.remove_from_index(&user_id, session_id).await?,
            None => debug!(session_id, "record already gone; index untouched"),
        }

        if removed {
            info!(session_id, "session deleted");
        }
        Ok(removed)
    }

    /// Remove a session id from a known user's index without needing the
    /// record. Lets callers clean up after TTL expiry.
    pub async fn remove_from_index(&self, user_id: &str, session_id: &str) -> Result<()> {
        let key = Self::index_key(user_id);
        let mut ids: Vec<String> = self
            .pool
            .get(&key, Namespace::Session)
            .await?
            .unwrap_or_default();

        let before = ids.len();
        ids.retain(|id| id != session_id);

        if ids.len() == before {
            return Ok(());
        }

        if ids.is_empty() {
            self.pool.delete(&key, Namespace::Session).await?;
        } else {
            self.pool.set(&key, &ids, Namespace::Session, None).await?;
        }
        Ok(())
    }

    /// All live sessions for a user. Ids whose record has expired are
    /// dropped from the result and pruned from the index.
    #[instrument(skip(self), target = "session", fields(user_id = %user_id))]
    pub async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let ids: Vec<String> = self
            .pool
            .get(&Self::index_key(user_id), Namespace::Session)
            .await?
            .unwrap_or_default();

        let now = Utc::now();
        let mut sessions = Vec::with_capacity(ids.len());

        for id in ids {
            match self.peek_session(&id).await? {
                Some(s) if s.is_live(now) => sessions.push(s),
                Some(_) | None => {
                    if let Err(e) = self.remove_from_index(user_id, &id).await {
                        warn!(error = %e, session_id = %id, "failed to prune stale index entry");
                    }
                }
            }
        }

        Ok(sessions)
    }

    async fn add_to_index(&self, user_id: &str, session_id: &str) -> Result<()> {
        let key = Self::index_key(user_id);
        let mut ids: Vec<String> = self
            .pool
            .get(&key, Namespace::Session)
            .await?
            .unwrap_or_default();

        if !ids.iter().any(|id| id == session_id) {
            ids.push(session_id.to_string());
        }

        self.pool
            .set(&key, &ids, Namespace::Session, None)
            .await
            .context("failed to update user session index")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::CacheConfig;

    fn mk_store() -> SessionStore {
        SessionStore::new(Arc::new(CachePool::in_memory(CacheConfig::default())))
    }

    #[tokio::test]
    async fn create_then_get_bumps_activity() {
        let store = mk_store();
        let id = store
            .create_session("u1", None, Some("1.2.3.4"), Some("test-agent"))
            .await
            .unwrap();

        let first = store.peek_session(&id).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let fetched = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert!(fetched.last_activity >= first.last_activity);
        assert!(fetched.expires_at > fetched.last_activity);
    }

    #[tokio::test]
    async fn index_tracks_exact_session_set() {
        let store = mk_store();
        let a = store.create_session("u1", None, None, None).await.unwrap();
        let b = store.create_session("u1", None, None, None).await.unwrap();
        let _other = store.create_session("u2", None, None, None).await.unwrap();

        let sessions = store.get_user_sessions("u1").await.unwrap();
        let mut ids: Vec<_> = sessions.iter().map(|s| s.session_id.clone()).collect();
        ids.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn delete_removes_record_and_index_entry() {
        let store = mk_store();
        let a = store.create_session("u1", None, None, None).await.unwrap();
        let b = store.create_session("u1", None, None, None).await.unwrap();

        assert!(store.delete_session(&a).await.unwrap());

        assert!(store.peek_session(&a).await.unwrap().is_none());
        let remaining = store.get_user_sessions("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, b);
    }

    #[tokio::test]
    async fn delete_of_missing_record_still_cleans_index() {
        let store = mk_store();
        let id = store.create_session("u1", None, None, None).await.unwrap();

        // Simulate the record expiring while the index entry survives.
        store
            .pool
            .delete(&id, Namespace::Session)
            .await
            .unwrap();

        assert!(!store.delete_session(&id).await.unwrap());

        // Index entry is pruned lazily by the next listing.
        let sessions = store.get_user_sessions("u1").await.unwrap();
        assert!(sessions.is_empty());
        let ids: Option<Vec<String>> = store
            .pool
            .get(&SessionStore::index_key("u1"), Namespace::Session)
            .await
            .unwrap();
        assert!(ids.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn inactive_sessions_are_filtered_from_listing() {
        let store = mk_store();
        let id = store.create_session("u1", None, None, None).await.unwrap();

        let mut s = store.peek_session(&id).await.unwrap().unwrap();
        s.is_active = false;
        store.update_session(&id, &s).await.unwrap();

        assert!(store.get_user_sessions("u1").await.unwrap().is_empty());
        assert!(store.get_session(&id).await.unwrap().is_none());
    }
}
