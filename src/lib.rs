use axum::{
    Router,
    routing::{get, post, put},
    middleware::from_fn,
};

pub mod config;
pub mod error;
pub mod state;
pub mod crypto {
    pub mod aes;
    pub mod key;
    pub mod otp;
    pub mod token;
}

pub mod models {
    pub mod attendance;
    pub mod class_session;
    pub mod course;
    pub mod principal;
    pub mod settings;
}

pub mod repositories {
    pub mod attendance;
    pub mod class_session;
    pub mod course;
}

pub mod services {
    pub mod attendance;
    pub mod courses;
    pub mod geo;
    pub mod sessions;
}

pub mod handlers {
    pub mod admin;
    pub mod attendance;
    pub mod courses;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
}

use state::AppState;

/// Builds the API router. Every route requires a forwarded identity.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions/start", post(handlers::sessions::start_session))
        .route("/api/sessions/{session_id}/qr", get(handlers::sessions::current_qr))
        .route("/api/sessions/{session_id}/end", post(handlers::sessions::end_session))
        .route(
            "/api/sessions/{session_id}/attendance",
            get(handlers::sessions::list_attendance),
        )
        .route(
            "/api/sessions/{session_id}/attendance/manual",
            post(handlers::sessions::mark_manual),
        )
        .route("/api/courses/{course_id}/roster", put(handlers::courses::set_roster))
        .route("/api/attendance/verify", post(handlers::attendance::verify))
        .route("/api/attendance/mine", get(handlers::attendance::history))
        .route("/api/admin/sessions", get(handlers::admin::list_sessions))
        .route(
            "/api/admin/sessions/end-all",
            post(handlers::admin::end_all_sessions),
        )
        .route(
            "/api/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        )
        .route_layer(from_fn(middleware_layer::auth::require_principal))
        .with_state(state)
}
