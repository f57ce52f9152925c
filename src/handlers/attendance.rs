use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    models::principal::Principal,
    services::{attendance as attendance_service, geo::GeoPoint},
    state::AppState,
};

/// The request payload for a student's QR scan.
#[derive(Deserialize, Debug, Validate)]
pub struct ScanRequest {
    /// The envelope read from the QR image.
    #[garde(length(min = 1, max = 2048))]
    #[serde(alias = "qrPayload")]
    pub qr_payload: String,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[garde(length(max = 512))]
    #[serde(alias = "deviceInfo")]
    pub device_info: Option<String>,
}

/// Query parameters for a student's attendance history.
#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    #[serde(alias = "courseId")]
    pub course_id: Option<Uuid>,
}

/// Handles a student's QR scan.
pub async fn verify(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ScanRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let location = GeoPoint::from_parts(payload.latitude, payload.longitude)?;

    let outcome = attendance_service::verify_scan(
        &state,
        &principal,
        &payload.qr_payload,
        location,
        payload.device_info,
        Utc::now(),
    )
    .await?;

    Ok(Json(outcome))
}

/// Handles listing the caller's own attendance.
pub async fn history(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    let entries =
        attendance_service::attendance_history(&state, &principal, query.course_id).await?;
    Ok(Json(entries))
}
