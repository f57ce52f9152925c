use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::otp::SessionSecret;
use crate::services::geo::GeoPoint;

/// A running (or finished) class meeting that students check into.
///
/// ⚠️ `secret` keys the rotating QR codes and must never be serialized.
#[derive(Debug, Clone)]
pub struct ClassSession {
    pub id: Uuid,
    pub course_id: Uuid,
    /// The professor who started the session.
    pub professor_id: Uuid,
    pub secret: SessionSecret,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Classroom location, when the professor shared one.
    pub location: Option<GeoPoint>,
}

impl ClassSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn summary(&self, attendance_count: usize) -> SessionSummary {
        SessionSummary {
            id: self.id,
            course_id: self.course_id,
            professor_id: self.professor_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            latitude: self.location.map(|p| p.latitude),
            longitude: self.location.map(|p| p.longitude),
            attendance_count,
        }
    }
}

/// The public view of a class session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub course_id: Uuid,
    pub professor_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attendance_count: usize,
}
