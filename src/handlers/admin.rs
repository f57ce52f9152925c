use axum::{extract::State, response::IntoResponse, Extension, Json};
use chrono::Utc;
use serde::Serialize;

use crate::{
    error::Result,
    models::{
        principal::{Principal, Role},
        settings::Settings,
    },
    services::sessions as session_service,
    state::AppState,
};

/// The response payload for bulk session endings.
#[derive(Serialize)]
pub struct EndAllResponse {
    pub success: bool,
    pub count: usize,
}

/// Handles listing active sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse> {
    let sessions = session_service::list_active_sessions(&state, &principal).await?;
    Ok(Json(sessions))
}

/// Handles ending every active session.
pub async fn end_all_sessions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse> {
    let count = session_service::end_all_sessions(&state, &principal, Utc::now()).await?;
    Ok(Json(EndAllResponse {
        success: true,
        count,
    }))
}

/// Handles reading the attendance settings.
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse> {
    principal.require(Role::Admin)?;
    Ok(Json(state.settings.snapshot().await))
}

/// Handles replacing the attendance settings.
///
/// Changing the rotation interval invalidates codes already on screen.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<Settings>,
) -> Result<impl IntoResponse> {
    principal.require(Role::Admin)?;

    let stored = state.settings.replace(payload).await;
    tracing::info!("⚙️  Settings updated by admin {}", principal.user_id);
    Ok(Json(stored))
}
