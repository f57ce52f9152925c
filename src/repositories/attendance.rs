use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::attendance::AttendanceRecord;

/// In-memory attendance store with one record per (session, student).
#[derive(Clone, Default)]
pub struct AttendanceRepository {
    records: Arc<RwLock<HashMap<(Uuid, Uuid), AttendanceRecord>>>,
}

impl AttendanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` unless the student already has one for the session.
    pub async fn insert_if_absent(&self, record: AttendanceRecord) -> bool {
        let mut records = self.records.write().await;
        let key = (record.session_id, record.student_id);
        if records.contains_key(&key) {
            return false;
        }
        records.insert(key, record);
        true
    }

    pub async fn exists(&self, session_id: Uuid, student_id: Uuid) -> bool {
        let records = self.records.read().await;
        records.contains_key(&(session_id, student_id))
    }

    /// Records for a session, oldest first.
    pub async fn list_for_session(&self, session_id: Uuid) -> Vec<AttendanceRecord> {
        let records = self.records.read().await;
        let mut list: Vec<AttendanceRecord> = records
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.marked_at);
        list
    }

    /// Every record belonging to one student.
    pub async fn list_for_student(&self, student_id: Uuid) -> Vec<AttendanceRecord> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect()
    }

    pub async fn count_for_session(&self, session_id: Uuid) -> usize {
        let records = self.records.read().await;
        records.keys().filter(|(s, _)| *s == session_id).count()
    }
}
