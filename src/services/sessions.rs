use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::otp::new_secret;
use crate::error::{AppError, Result};
use crate::models::attendance::{AttendanceRecord, AttendanceStatus};
use crate::models::class_session::{ClassSession, SessionSummary};
use crate::models::principal::{Principal, Role};
use crate::services::geo::GeoPoint;
use crate::state::AppState;

/// The result of starting a class session.
#[derive(Debug, Serialize)]
pub struct StartedSession {
    pub session_id: Uuid,
    /// The first QR envelope to display.
    pub qr: String,
    pub rotation_interval_secs: u64,
    pub total_students: usize,
}

/// One QR frame for the presenter's screen.
#[derive(Debug, Serialize)]
pub struct QrFrame {
    pub session_id: Uuid,
    pub payload: String,
    pub rotation_interval_secs: u64,
    /// Seconds until the next rotation step begins.
    pub expires_in_secs: u64,
}

/// Fails unless `principal` is the professor running `session` or an admin.
fn require_owner_or_admin(principal: &Principal, session: &ClassSession) -> Result<()> {
    match principal.role {
        Role::Admin => Ok(()),
        Role::Professor if principal.user_id == session.professor_id => Ok(()),
        _ => {
            tracing::warn!(
                "❌ {} {} is not allowed to manage session {}",
                principal.role,
                principal.user_id,
                session.id
            );
            Err(AppError::Unauthorized)
        }
    }
}

/// Starts a class session for one of the professor's courses.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `professor` - The caller.
/// * `course_id` - The course being taught.
/// * `location` - The classroom location, enabling the geofence check.
/// * `now` - The start time.
pub async fn start_session(
    state: &AppState,
    professor: &Principal,
    course_id: Uuid,
    location: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> Result<StartedSession> {
    professor.require(Role::Professor)?;

    let course = state.courses.get(course_id).await.ok_or(AppError::NotFound)?;
    if course.professor_id != professor.user_id {
        tracing::warn!(
            "❌ Professor {} tried to start course {} they do not teach",
            professor.user_id,
            course_id
        );
        return Err(AppError::NotFound);
    }

    let (codec, settings) = state.current_codec().await;
    let session = ClassSession {
        id: Uuid::new_v4(),
        course_id,
        professor_id: professor.user_id,
        secret: new_secret(),
        started_at: now,
        ended_at: None,
        location,
    };

    let qr = codec.issue(&session.id.to_string(), &session.secret, now)?;
    let session_id = session.id;
    state.sessions.insert(session).await;

    tracing::info!(
        "✅ Session {} started for course {} by {}",
        session_id,
        course_id,
        professor.user_id
    );

    Ok(StartedSession {
        session_id,
        qr,
        rotation_interval_secs: settings.rotation_interval_secs,
        total_students: course.students.len(),
    })
}

/// Issues a fresh QR envelope for an active session.
pub async fn current_qr(
    state: &AppState,
    professor: &Principal,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<QrFrame> {
    professor.require(Role::Professor)?;

    let session = state
        .sessions
        .get_active(session_id)
        .await
        .ok_or(AppError::NotFound)?;
    if session.professor_id != professor.user_id {
        return Err(AppError::Unauthorized);
    }

    let (codec, settings) = state.current_codec().await;
    let payload = codec.issue(&session.id.to_string(), &session.secret, now)?;

    let interval = settings.rotation_interval_secs.max(1);
    let elapsed = u64::try_from(now.timestamp()).unwrap_or(0) % interval;
    tracing::debug!("🔄 QR rotated for session {}", session_id);

    Ok(QrFrame {
        session_id,
        payload,
        rotation_interval_secs: interval,
        expires_in_secs: interval - elapsed,
    })
}

/// Ends a session. Its envelopes stop verifying immediately.
pub async fn end_session(
    state: &AppState,
    principal: &Principal,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let session = state.sessions.get(session_id).await.ok_or(AppError::NotFound)?;
    require_owner_or_admin(principal, &session)?;

    state.sessions.end(session_id, now).await;
    tracing::info!("✅ Session {} ended by {}", session_id, principal.user_id);
    Ok(())
}

/// Ends every active session. Returns how many were ended.
pub async fn end_all_sessions(
    state: &AppState,
    admin: &Principal,
    now: DateTime<Utc>,
) -> Result<usize> {
    admin.require(Role::Admin)?;

    let ended = state.sessions.end_all(now).await;
    tracing::info!("✅ Admin {} ended {} active sessions", admin.user_id, ended.len());
    Ok(ended.len())
}

/// Ends sessions older than the configured auto-end age, when enabled.
pub async fn auto_end_stale_sessions(state: &AppState, now: DateTime<Utc>) -> Vec<Uuid> {
    let settings = state.settings.snapshot().await;
    if !settings.auto_end_sessions {
        return Vec::new();
    }

    let cutoff = now - TimeDelta::hours(settings.auto_end_hours);
    let ended = state.sessions.end_started_before(cutoff, now).await;
    if !ended.is_empty() {
        tracing::info!(
            "🧹 Auto-ended {} sessions older than {}h",
            ended.len(),
            settings.auto_end_hours
        );
    }
    ended
}

/// Lists active sessions with their attendance counts.
pub async fn list_active_sessions(
    state: &AppState,
    admin: &Principal,
) -> Result<Vec<SessionSummary>> {
    admin.require(Role::Admin)?;

    let mut summaries = Vec::new();
    for session in state.sessions.list_active().await {
        let count = state.attendance.count_for_session(session.id).await;
        summaries.push(session.summary(count));
    }
    Ok(summaries)
}

/// Lists a session's attendance records, oldest first.
pub async fn list_attendance(
    state: &AppState,
    principal: &Principal,
    session_id: Uuid,
) -> Result<Vec<AttendanceRecord>> {
    let session = state.sessions.get(session_id).await.ok_or(AppError::NotFound)?;
    require_owner_or_admin(principal, &session)?;

    Ok(state.attendance.list_for_session(session_id).await)
}

/// Records attendance on a student's behalf.
pub async fn mark_manual(
    state: &AppState,
    professor: &Principal,
    session_id: Uuid,
    student_id: Uuid,
    status: AttendanceStatus,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord> {
    professor.require(Role::Professor)?;

    let settings = state.settings.snapshot().await;
    if !settings.allow_manual_attendance {
        tracing::warn!("❌ Manual attendance is disabled");
        return Err(AppError::Unauthorized);
    }

    let session = state.sessions.get(session_id).await.ok_or(AppError::NotFound)?;
    if session.professor_id != professor.user_id {
        return Err(AppError::Unauthorized);
    }

    if !state.courses.is_enrolled(session.course_id, student_id).await {
        return Err(AppError::NotEnrolled);
    }

    let record = AttendanceRecord {
        id: Uuid::new_v4(),
        session_id,
        student_id,
        status,
        marked_at: now,
        marked_by: Some(professor.user_id),
        latitude: None,
        longitude: None,
        device_info: None,
    };

    if !state.attendance.insert_if_absent(record.clone()).await {
        return Err(AppError::AlreadyMarked);
    }

    tracing::info!(
        "✅ {} marked {:?} for session {} by {}",
        student_id,
        status,
        session_id,
        professor.user_id
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::aes::generate_key;
    use crate::models::settings::Settings;
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    async fn state_with_course(settings: Settings) -> (AppState, Principal, Uuid) {
        let config = Config {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            envelope_key: generate_key(),
            settings,
        };
        let state = AppState::new(&config);
        let professor = Principal::new(Uuid::new_v4(), Role::Professor);
        let course_id = Uuid::new_v4();
        state
            .courses
            .upsert_roster(course_id, professor.user_id, HashSet::new())
            .await
            .unwrap();
        (state, professor, course_id)
    }

    #[tokio::test]
    async fn only_the_course_owner_can_start_and_present() {
        let (state, professor, course_id) = state_with_course(Settings::default()).await;
        let other = Principal::new(Uuid::new_v4(), Role::Professor);

        let result = start_session(&state, &other, course_id, None, t0()).await;
        assert!(matches!(result, Err(AppError::NotFound)));

        let started = start_session(&state, &professor, course_id, None, t0()).await.unwrap();
        assert_eq!(started.rotation_interval_secs, 10);
        assert_eq!(started.total_students, 0);

        let result = current_qr(&state, &other, started.session_id, t0()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn qr_frame_reports_time_left_in_the_step() {
        let (state, professor, course_id) = state_with_course(Settings::default()).await;
        let started = start_session(&state, &professor, course_id, None, t0()).await.unwrap();

        let frame = current_qr(&state, &professor, started.session_id, t0() + TimeDelta::seconds(3))
            .await
            .unwrap();
        assert_eq!(frame.expires_in_secs, 7);
        assert_ne!(frame.payload, started.qr);
    }

    #[tokio::test]
    async fn admins_can_end_any_session() {
        let (state, professor, course_id) = state_with_course(Settings::default()).await;
        let admin = Principal::new(Uuid::new_v4(), Role::Admin);
        let student = Principal::new(Uuid::new_v4(), Role::Student);
        let started = start_session(&state, &professor, course_id, None, t0()).await.unwrap();

        let result = end_session(&state, &student, started.session_id, t0()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));

        end_session(&state, &admin, started.session_id, t0()).await.unwrap();
        assert!(state.sessions.get_active(started.session_id).await.is_none());
        assert!(list_active_sessions(&state, &admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_all_counts_only_active_sessions() {
        let (state, professor, course_id) = state_with_course(Settings::default()).await;
        let admin = Principal::new(Uuid::new_v4(), Role::Admin);

        let first = start_session(&state, &professor, course_id, None, t0()).await.unwrap();
        start_session(&state, &professor, course_id, None, t0()).await.unwrap();
        end_session(&state, &professor, first.session_id, t0()).await.unwrap();

        assert!(matches!(
            end_all_sessions(&state, &professor, t0()).await,
            Err(AppError::Unauthorized)
        ));
        assert_eq!(end_all_sessions(&state, &admin, t0()).await.unwrap(), 1);
        assert_eq!(end_all_sessions(&state, &admin, t0()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn auto_end_respects_age_and_switch() {
        let (state, professor, course_id) = state_with_course(Settings::default()).await;
        let old = start_session(&state, &professor, course_id, None, t0()).await.unwrap();
        let fresh = start_session(&state, &professor, course_id, None, t0() + TimeDelta::hours(3))
            .await
            .unwrap();

        let ended = auto_end_stale_sessions(&state, t0() + TimeDelta::hours(5)).await;
        assert_eq!(ended, vec![old.session_id]);
        assert!(state.sessions.get_active(fresh.session_id).await.is_some());

        let disabled = Settings {
            auto_end_sessions: false,
            ..Settings::default()
        };
        state.settings.replace(disabled).await;
        assert!(auto_end_stale_sessions(&state, t0() + TimeDelta::hours(24)).await.is_empty());
    }

    #[tokio::test]
    async fn manual_marking_can_be_disabled() {
        let (state, professor, course_id) = state_with_course(Settings::default()).await;
        let started = start_session(&state, &professor, course_id, None, t0()).await.unwrap();
        let disabled = Settings {
            allow_manual_attendance: false,
            ..Settings::default()
        };
        state.settings.replace(disabled).await;

        let result = mark_manual(
            &state,
            &professor,
            started.session_id,
            Uuid::new_v4(),
            AttendanceStatus::Present,
            t0(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
