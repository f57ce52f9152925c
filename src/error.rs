use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crypto::token::Rejection;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The caller did not present a usable identity.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller's role or ownership does not allow the operation.
    #[error("Authorization failed")]
    Unauthorized,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A scanned QR envelope was rejected by the token codec.
    #[error("Scan rejected: {0}")]
    ScanRejected(Rejection),

    /// The envelope verified, but it names a different session than the secret used.
    #[error("Scan rejected: session id mismatch")]
    SessionIdMismatch,

    /// The student is not enrolled in the session's course.
    #[error("Not enrolled in this course")]
    NotEnrolled,

    /// Attendance for this student and session already exists.
    #[error("Attendance already recorded")]
    AlreadyMarked,

    /// The scan location is outside the allowed radius.
    #[error("Too far from the classroom ({distance_m:.0}m)")]
    OutOfRange { distance_m: f64 },

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Validation(report.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string())
            }

            AppError::ScanRejected(rejection) => {
                tracing::debug!("Scan rejected: {}", rejection.as_str());
                (StatusCode::BAD_REQUEST, rejection.user_message().to_string())
            }

            AppError::SessionIdMismatch => {
                tracing::warn!("Scan rejected: session id mismatch");
                (
                    StatusCode::BAD_REQUEST,
                    Rejection::CodeMismatch.user_message().to_string(),
                )
            }

            AppError::NotEnrolled => {
                tracing::debug!("Scan from a student outside the roster");
                (StatusCode::FORBIDDEN, "Not enrolled in this course".to_string())
            }

            AppError::AlreadyMarked => {
                tracing::debug!("Duplicate attendance scan");
                (StatusCode::CONFLICT, "Attendance already recorded".to_string())
            }

            AppError::OutOfRange { distance_m } => {
                tracing::debug!("Scan outside geofence: {:.0}m", distance_m);
                (
                    StatusCode::BAD_REQUEST,
                    format!("Too far from the classroom ({:.0}m)", distance_m),
                )
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
