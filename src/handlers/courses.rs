use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    models::principal::Principal,
    services::courses as course_service,
    state::AppState,
};

/// The request payload for replacing a course roster.
#[derive(Deserialize, Debug, Validate)]
pub struct RosterRequest {
    #[garde(length(max = 2000))]
    pub students: Vec<Uuid>,
}

/// Handles replacing a course roster.
pub async fn set_roster(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<RosterRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let students: HashSet<Uuid> = payload.students.into_iter().collect();
    let summary = course_service::set_roster(&state, &principal, course_id, students).await?;
    Ok(Json(summary))
}
