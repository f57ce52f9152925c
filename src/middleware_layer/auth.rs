use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::principal::{Principal, Role},
};

/// Header carrying the authenticated user's ID, set by the upstream identity proxy.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Reads the caller identity forwarded by the upstream proxy.
///
/// # Returns
///
/// The `Principal`, or an `Authentication` error naming what is missing.
fn extract_principal(headers: &HeaderMap) -> Result<Principal, AppError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Missing user identity".to_string()))?;
    let user_id = Uuid::parse_str(user_id.trim())
        .map_err(|_| AppError::Authentication("Invalid user identity".to_string()))?;

    let role: Role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Missing user role".to_string()))?
        .parse()?;

    Ok(Principal::new(user_id, role))
}

/// A middleware that requires a forwarded identity to be present.
///
/// # Arguments
///
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`, or a 401 when the identity headers are missing or invalid.
pub async fn require_principal(mut request: Request<Body>, next: Next) -> Response {
    tracing::debug!("🔐 Checking forwarded identity...");

    let principal = match extract_principal(request.headers()) {
        Ok(principal) => principal,
        Err(e) => return e.into_response(),
    };

    tracing::debug!("✅ Caller {} ({})", principal.user_id, principal.role);

    request.extensions_mut().insert(principal);

    next.run(request).await
}
