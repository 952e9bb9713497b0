//! In-memory, process-local session store (spec.md §3 "Session", §5).
//! A single `RwLock` guards the map; reads return an owned copy so that a
//! concurrent `refresh` never races a caller inspecting a session it
//! already fetched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::schema::Role;

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// A fresh, URL-safe, ≥256-bit session id.
fn generate_session_id() -> String {
    format!("{:032x}{:032x}", rand::random::<u128>(), rand::random::<u128>())
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub created_at: u64,
    pub expires_at: u64,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    max_age_secs: AtomicU64,
}

impl SessionStore {
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age_secs: AtomicU64::new(max_age_secs),
        }
    }

    /// Update the sliding window applied to future creates/refreshes —
    /// called by the auth plane's config observer when `session_max_age_secs`
    /// changes. Does not retroactively change already-issued expiries.
    pub fn set_max_age_secs(&self, max_age_secs: u64) {
        self.max_age_secs.store(max_age_secs, Ordering::SeqCst);
    }

    fn max_age_secs(&self) -> u64 {
        self.max_age_secs.load(Ordering::SeqCst)
    }

    pub async fn create(&self, user_id: String, username: String, role: Role) -> Session {
        let now = now_secs();
        let session = Session {
            id: generate_session_id(),
            user_id,
            username,
            role,
            created_at: now,
            expires_at: now + self.max_age_secs(),
        };
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a session by id. If present and not expired, slides its
    /// expiry forward and returns the refreshed copy; a request observed at
    /// exactly `expires_at` is still valid, one at `expires_at + 1` is not.
    pub async fn get_and_refresh(&self, id: &str) -> Option<Session> {
        let now = now_secs();
        let mut guard = self.sessions.write().await;
        let session = guard.get_mut(id)?;
        if session.expires_at < now {
            guard.remove(id);
            return None;
        }
        session.expires_at = now + self.max_age_secs();
        Some(session.clone())
    }

    pub async fn delete(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Invalidate all of a user's sessions except `except_id` — used on
    /// password change so the changer's own session survives.
    pub async fn delete_by_user_except(&self, user_id: &str, except_id: &str) {
        self.sessions
            .write()
            .await
            .retain(|id, s| !(s.user_id == user_id) || id == except_id);
    }

    pub async fn delete_all_for_user(&self, user_id: &str) {
        self.sessions.write().await.retain(|_, s| s.user_id != user_id);
    }

    pub async fn sweep_expired(&self) -> usize {
        let now = now_secs();
        let mut guard = self.sessions.write().await;
        let before = guard.len();
        guard.retain(|_, s| s.expires_at >= now);
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expiry_boundary_matches_spec() {
        let store = SessionStore::new(0);
        let session = store.create("u1".into(), "alice".into(), Role::User).await;
        // max_age_secs == 0: expires_at == created_at == now.
        assert!(store.get_and_refresh(&session.id).await.is_some());
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(store.get_and_refresh(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn password_change_keeps_callers_session() {
        let store = SessionStore::new(3600);
        let caller = store.create("u1".into(), "alice".into(), Role::User).await;
        let other = store.create("u1".into(), "alice".into(), Role::User).await;

        store.delete_by_user_except("u1", &caller.id).await;

        assert!(store.get_and_refresh(&caller.id).await.is_some());
        assert!(store.get_and_refresh(&other.id).await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let store = SessionStore::new(3600);
        let fresh = store.create("u1".into(), "alice".into(), Role::User).await;
        let stale = store.create("u2".into(), "bob".into(), Role::User).await;
        {
            let mut guard = store.sessions.write().await;
            guard.get_mut(&stale.id).unwrap().expires_at = 0;
        }
        let removed = store.sweep_expired().await;
        assert_eq!(removed, 1);
        assert!(store.get_and_refresh(&fresh.id).await.is_some());
    }
}
