use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{attendance::AttendanceStatus, principal::Principal},
    services::{geo::GeoPoint, sessions as session_service},
    state::AppState,
};

/// The request payload for starting a class session.
#[derive(Deserialize, Debug, Validate)]
pub struct StartSessionRequest {
    #[garde(skip)]
    #[serde(alias = "courseId")]
    pub course_id: Uuid,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

/// The request payload for marking attendance by hand.
#[derive(Deserialize, Debug, Validate)]
pub struct ManualAttendanceRequest {
    #[garde(skip)]
    #[serde(alias = "studentId")]
    pub student_id: Uuid,
    #[garde(skip)]
    pub status: AttendanceStatus,
}

/// The response payload for a session's attendance list.
#[derive(Serialize)]
pub struct AttendanceListResponse<T: Serialize> {
    pub records: Vec<T>,
    pub count: usize,
}

/// The response payload for simple acknowledgements.
#[derive(Serialize)]
pub struct AckResponse {
    pub success: bool,
}

/// Handles starting a class session.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let location = GeoPoint::from_parts(payload.latitude, payload.longitude)?;

    let started = session_service::start_session(
        &state,
        &principal,
        payload.course_id,
        location,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(started)))
}

/// Handles a presenter's request for the current QR envelope.
pub async fn current_qr(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let frame = session_service::current_qr(&state, &principal, session_id, Utc::now()).await?;
    Ok(Json(frame))
}

/// Handles ending a class session.
pub async fn end_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    session_service::end_session(&state, &principal, session_id, Utc::now()).await?;
    Ok(Json(AckResponse { success: true }))
}

/// Handles listing a session's attendance.
pub async fn list_attendance(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let records = session_service::list_attendance(&state, &principal, session_id).await?;
    let count = records.len();
    Ok(Json(AttendanceListResponse { records, count }))
}

/// Handles marking attendance by hand.
pub async fn mark_manual(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ManualAttendanceRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let record = session_service::mark_manual(
        &state,
        &principal,
        session_id,
        payload.student_id,
        payload.status,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}
