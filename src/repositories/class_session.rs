use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::class_session::ClassSession;

/// In-memory store of class sessions, keyed by session ID.
#[derive(Clone, Default)]
pub struct ClassSessionRepository {
    sessions: Arc<RwLock<HashMap<Uuid, ClassSession>>>,
}

impl ClassSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: ClassSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session);
    }

    pub async fn get(&self, id: Uuid) -> Option<ClassSession> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).cloned()
    }

    /// Gets a session only while it has not ended.
    pub async fn get_active(&self, id: Uuid) -> Option<ClassSession> {
        let sessions = self.sessions.read().await;
        sessions.get(&id).filter(|s| s.is_active()).cloned()
    }

    pub async fn list_active(&self) -> Vec<ClassSession> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<ClassSession> =
            sessions.values().filter(|s| s.is_active()).cloned().collect();
        active.sort_by_key(|s| s.started_at);
        active
    }

    /// Ends a session. Returns `false` if it does not exist; ending twice keeps the first end time.
    pub async fn end(&self, id: Uuid, at: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(session) => {
                session.ended_at.get_or_insert(at);
                true
            }
            None => false,
        }
    }

    /// Ends every active session, returning their IDs.
    pub async fn end_all(&self, at: DateTime<Utc>) -> Vec<Uuid> {
        let mut sessions = self.sessions.write().await;
        sessions
            .values_mut()
            .filter(|s| s.is_active())
            .map(|s| {
                s.ended_at = Some(at);
                s.id
            })
            .collect()
    }

    /// Ends every active session started at or before `cutoff`, returning their IDs.
    pub async fn end_started_before(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Vec<Uuid> {
        let mut sessions = self.sessions.write().await;
        sessions
            .values_mut()
            .filter(|s| s.is_active() && s.started_at <= cutoff)
            .map(|s| {
                s.ended_at = Some(at);
                s.id
            })
            .collect()
    }
}
