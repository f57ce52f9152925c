use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::token::Rejection;
use crate::error::{AppError, Result};
use crate::models::attendance::{AttendanceRecord, AttendanceStatus};
use crate::models::principal::{Principal, Role};
use crate::services::geo::{distance_meters, GeoPoint};
use crate::state::AppState;

/// What a student sees after a successful scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub session_id: Uuid,
    pub status: AttendanceStatus,
    pub minutes_late: i64,
    pub message: String,
}

fn rejected(rejection: Rejection) -> AppError {
    tracing::debug!("🔍 Scan rejected by codec: {}", rejection.as_str());
    AppError::ScanRejected(rejection)
}

/// Verifies a scanned QR envelope and records the student's attendance.
///
/// The envelope is opened with the system key first, and its embedded session
/// ID selects the one secret to check the code against. Unknown and ended
/// sessions are reported as a code mismatch.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `student` - The scanning student.
/// * `envelope` - The scanned QR payload.
/// * `location` - Where the scan happened, if the device shared it.
/// * `device_info` - Free-form device description stored with the record.
/// * `now` - The scan time.
pub async fn verify_scan(
    state: &AppState,
    student: &Principal,
    envelope: &str,
    location: Option<GeoPoint>,
    device_info: Option<String>,
    now: DateTime<Utc>,
) -> Result<ScanOutcome> {
    student.require(Role::Student)?;

    let (codec, settings) = state.current_codec().await;
    let claims = codec.open(envelope).map_err(rejected)?;

    let session_id =
        Uuid::parse_str(&claims.session_id).map_err(|_| rejected(Rejection::CodeMismatch))?;
    let session = state
        .sessions
        .get_active(session_id)
        .await
        .ok_or_else(|| rejected(Rejection::CodeMismatch))?;

    let verified = codec
        .check(&claims, &session.secret, now, settings.tolerance_steps)
        .map_err(rejected)?;
    if verified.session_id != session.id.to_string() {
        tracing::warn!(
            "❌ Envelope for {} verified under the secret of {}",
            verified.session_id,
            session.id
        );
        return Err(AppError::SessionIdMismatch);
    }

    if !state.courses.is_enrolled(session.course_id, student.user_id).await {
        return Err(AppError::NotEnrolled);
    }

    if state.attendance.exists(session.id, student.user_id).await {
        return Err(AppError::AlreadyMarked);
    }

    match (session.location, location) {
        (Some(classroom), Some(scanned)) => {
            let distance_m = distance_meters(classroom, scanned);
            if distance_m > settings.geolocation_radius_m {
                return Err(AppError::OutOfRange { distance_m });
            }
        }
        (Some(_), None) if settings.require_geolocation => {
            return Err(AppError::Validation(
                "Location is required to mark attendance".to_string(),
            ));
        }
        _ => {}
    }

    let minutes_late = (now - session.started_at).num_minutes().max(0);
    let status = if minutes_late > settings.late_threshold_minutes {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    };

    let record = AttendanceRecord {
        id: Uuid::new_v4(),
        session_id: session.id,
        student_id: student.user_id,
        status,
        marked_at: now,
        marked_by: None,
        latitude: location.map(|p| p.latitude),
        longitude: location.map(|p| p.longitude),
        device_info,
    };

    if !state.attendance.insert_if_absent(record).await {
        return Err(AppError::AlreadyMarked);
    }

    tracing::info!(
        "✅ Attendance recorded: student {} session {} ({:?})",
        student.user_id,
        session.id,
        status
    );

    let message = match status {
        AttendanceStatus::Late => format!("Attendance recorded (late: +{} min)", minutes_late),
        _ => "Attendance recorded".to_string(),
    };

    Ok(ScanOutcome {
        session_id: session.id,
        status,
        minutes_late,
        message,
    })
}

/// One line of a student's attendance history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub course_id: Uuid,
    pub session_started_at: DateTime<Utc>,
    pub marked_at: DateTime<Utc>,
    pub status: AttendanceStatus,
}

/// Lists the calling student's own attendance, newest session first.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `student` - The caller.
/// * `course_id` - Restricts the history to one course when set.
pub async fn attendance_history(
    state: &AppState,
    student: &Principal,
    course_id: Option<Uuid>,
) -> Result<Vec<HistoryEntry>> {
    student.require(Role::Student)?;

    let mut entries = Vec::new();
    for record in state.attendance.list_for_student(student.user_id).await {
        let Some(session) = state.sessions.get(record.session_id).await else {
            continue;
        };
        if course_id.is_some_and(|id| id != session.course_id) {
            continue;
        }
        entries.push(HistoryEntry {
            id: record.id,
            session_id: session.id,
            course_id: session.course_id,
            session_started_at: session.started_at,
            marked_at: record.marked_at,
            status: record.status,
        });
    }

    entries.sort_by(|a, b| b.session_started_at.cmp(&a.session_started_at));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::aes::generate_key;
    use crate::crypto::otp::new_secret;
    use crate::models::settings::Settings;
    use crate::services::sessions;
    use chrono::TimeDelta;
    use std::collections::HashSet;

    struct Fixture {
        state: AppState,
        professor: Principal,
        student: Principal,
        course_id: Uuid,
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    async fn fixture(settings: Settings) -> Fixture {
        let config = Config {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            envelope_key: generate_key(),
            settings,
        };
        let state = AppState::new(&config);
        let professor = Principal::new(Uuid::new_v4(), Role::Professor);
        let student = Principal::new(Uuid::new_v4(), Role::Student);
        let course_id = Uuid::new_v4();

        state
            .courses
            .upsert_roster(course_id, professor.user_id, HashSet::from([student.user_id]))
            .await
            .unwrap();

        Fixture {
            state,
            professor,
            student,
            course_id,
        }
    }

    async fn start(f: &Fixture, location: Option<GeoPoint>) -> (Uuid, String) {
        let started = sessions::start_session(&f.state, &f.professor, f.course_id, location, t0())
            .await
            .unwrap();
        (started.session_id, started.qr)
    }

    #[tokio::test]
    async fn fresh_scan_marks_the_student_present() {
        let f = fixture(Settings::default()).await;
        let (session_id, qr) = start(&f, None).await;

        let outcome = verify_scan(&f.state, &f.student, &qr, None, Some("phone".into()), t0())
            .await
            .unwrap();

        assert_eq!(outcome.session_id, session_id);
        assert_eq!(outcome.status, AttendanceStatus::Present);

        let records = f.state.attendance.list_for_session(session_id).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].device_info.as_deref(), Some("phone"));
        assert_eq!(records[0].marked_by, None);
    }

    #[tokio::test]
    async fn second_scan_is_rejected_as_duplicate() {
        let f = fixture(Settings::default()).await;
        let (_, qr) = start(&f, None).await;

        verify_scan(&f.state, &f.student, &qr, None, None, t0()).await.unwrap();
        let again = verify_scan(&f.state, &f.student, &qr, None, None, t0()).await;
        assert!(matches!(again, Err(AppError::AlreadyMarked)));
    }

    #[tokio::test]
    async fn ended_sessions_no_longer_verify() {
        let f = fixture(Settings::default()).await;
        let (session_id, qr) = start(&f, None).await;

        sessions::end_session(&f.state, &f.professor, session_id, t0()).await.unwrap();

        let result = verify_scan(&f.state, &f.student, &qr, None, None, t0()).await;
        assert!(matches!(
            result,
            Err(AppError::ScanRejected(Rejection::CodeMismatch))
        ));
    }

    #[tokio::test]
    async fn stale_envelopes_are_expired() {
        let f = fixture(Settings::default()).await;
        let (_, qr) = start(&f, None).await;

        let result =
            verify_scan(&f.state, &f.student, &qr, None, None, t0() + TimeDelta::seconds(35)).await;
        assert!(matches!(result, Err(AppError::ScanRejected(Rejection::Expired))));
    }

    #[tokio::test]
    async fn envelope_for_unknown_session_or_secret_is_a_code_mismatch() {
        let f = fixture(Settings::default()).await;
        let (session_id, _) = start(&f, None).await;
        let session = f.state.sessions.get(session_id).await.unwrap();

        // Sealed under the right key and secret, but naming a session that is not running.
        let forged = f
            .state
            .codec
            .issue(&Uuid::new_v4().to_string(), &session.secret, t0())
            .unwrap();
        let result = verify_scan(&f.state, &f.student, &forged, None, None, t0()).await;
        assert!(matches!(
            result,
            Err(AppError::ScanRejected(Rejection::CodeMismatch))
        ));

        let other_secret = f.state.codec.issue(&session_id.to_string(), &new_secret(), t0()).unwrap();
        let result = verify_scan(&f.state, &f.student, &other_secret, None, None, t0()).await;
        assert!(matches!(
            result,
            Err(AppError::ScanRejected(Rejection::CodeMismatch))
        ));
    }

    #[tokio::test]
    async fn sid_spelled_differently_from_the_session_id_is_refused() {
        let f = fixture(Settings::default()).await;
        let (session_id, _) = start(&f, None).await;
        let session = f.state.sessions.get(session_id).await.unwrap();

        // Parses to the same UUID and matches the secret, but is not the issued id.
        let uppercase = f
            .state
            .codec
            .issue(&session_id.to_string().to_uppercase(), &session.secret, t0())
            .unwrap();
        let result = verify_scan(&f.state, &f.student, &uppercase, None, None, t0()).await;
        assert!(matches!(result, Err(AppError::SessionIdMismatch)));
        assert!(!f.state.attendance.exists(session_id, f.student.user_id).await);
    }

    #[tokio::test]
    async fn students_outside_the_roster_are_refused() {
        let f = fixture(Settings::default()).await;
        let (_, qr) = start(&f, None).await;
        let stranger = Principal::new(Uuid::new_v4(), Role::Student);

        let result = verify_scan(&f.state, &stranger, &qr, None, None, t0()).await;
        assert!(matches!(result, Err(AppError::NotEnrolled)));
    }

    #[tokio::test]
    async fn only_students_can_scan() {
        let f = fixture(Settings::default()).await;
        let (_, qr) = start(&f, None).await;

        let result = verify_scan(&f.state, &f.professor, &qr, None, None, t0()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn geofence_rejects_distant_scans() {
        let f = fixture(Settings::default()).await;
        let classroom = GeoPoint::new(-12.0464, -77.0428);
        let (_, qr) = start(&f, Some(classroom)).await;

        let far = GeoPoint::new(-12.0564, -77.0428);
        let result = verify_scan(&f.state, &f.student, &qr, Some(far), None, t0()).await;
        assert!(matches!(result, Err(AppError::OutOfRange { distance_m }) if distance_m > 1000.0));

        let near = GeoPoint::new(-12.0465, -77.0428);
        assert!(verify_scan(&f.state, &f.student, &qr, Some(near), None, t0()).await.is_ok());
    }

    #[tokio::test]
    async fn required_geolocation_rejects_scans_without_location() {
        let settings = Settings {
            require_geolocation: true,
            ..Settings::default()
        };
        let f = fixture(settings).await;
        let (_, qr) = start(&f, Some(GeoPoint::new(0.0, 0.0))).await;

        let result = verify_scan(&f.state, &f.student, &qr, None, None, t0()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn history_lists_only_the_callers_records() {
        let f = fixture(Settings::default()).await;
        let (first, qr) = start(&f, None).await;
        verify_scan(&f.state, &f.student, &qr, None, None, t0()).await.unwrap();

        let later = t0() + TimeDelta::hours(1);
        let second = sessions::start_session(&f.state, &f.professor, f.course_id, None, later)
            .await
            .unwrap();
        verify_scan(&f.state, &f.student, &second.qr, None, None, later)
            .await
            .unwrap();

        let history = attendance_history(&f.state, &f.student, None).await.unwrap();
        let ids: Vec<Uuid> = history.iter().map(|e| e.session_id).collect();
        assert_eq!(ids, vec![second.session_id, first]);
        assert!(history.iter().all(|e| e.course_id == f.course_id));

        let elsewhere = attendance_history(&f.state, &f.student, Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(elsewhere.is_empty());

        let classmate = Principal::new(Uuid::new_v4(), Role::Student);
        assert!(attendance_history(&f.state, &classmate, None).await.unwrap().is_empty());
        assert!(matches!(
            attendance_history(&f.state, &f.professor, None).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn late_scans_are_marked_late() {
        let f = fixture(Settings::default()).await;
        let (session_id, _) = start(&f, None).await;

        let later = t0() + TimeDelta::minutes(20);
        let frame = sessions::current_qr(&f.state, &f.professor, session_id, later)
            .await
            .unwrap();
        let outcome = verify_scan(&f.state, &f.student, &frame.payload, None, None, later)
            .await
            .unwrap();

        assert_eq!(outcome.status, AttendanceStatus::Late);
        assert_eq!(outcome.minutes_late, 20);
        assert!(outcome.message.contains("+20 min"));
    }
}
