pub mod admin;
pub use self::admin::admin_gate;

pub mod client;
pub use self::client::ClientMeta;

pub mod health;
pub use self::health::health;

pub mod mfa;
pub use self::mfa::verify;

// common functions for the handlers
use crate::security::SecurityError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde_json::json;

/// Normalize an email for lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Map a core error to a response. Client-facing messages are the generic
/// `Display` of the error; internal detail stays in the logs.
pub fn security_error_response(err: &SecurityError) -> Response {
    match err {
        SecurityError::Lockout => error_response(StatusCode::TOO_MANY_REQUESTS, &err.to_string()),
        SecurityError::Validation => error_response(StatusCode::UNAUTHORIZED, &err.to_string()),
        SecurityError::Parse(_) => error_response(StatusCode::BAD_REQUEST, "invalid request"),
        SecurityError::Config(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "configuration error")
        }
    }
}
