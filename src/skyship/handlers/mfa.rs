//! Second-factor verification endpoint.

use super::{normalize_email, security_error_response, ClientMeta};
use crate::security::{LoginContext, SecondFactor, SecurityError, TotpSecret};
use crate::skyship::state::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

impl std::fmt::Debug for VerifyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Six-digit codes are checked as TOTP first; any code that is not a valid
/// TOTP is then tried against the account's backup codes.
#[instrument(skip(state))]
pub async fn verify(
    Extension(state): Extension<Arc<AppState>>,
    client: ClientMeta,
    Json(request): Json<VerifyRequest>,
) -> Response {
    let email = normalize_email(&request.email);
    let code = request.code.trim();
    let now = state.clock.now();
    let context = LoginContext {
        email: &email,
        source_address: client.address_or_unknown(),
        user_agent: client.user_agent.as_deref(),
    };

    let guard = &state.guard;
    let outcome = state
        .enrollments
        .with_enrollment(&email, |enrollment| {
            let codes = &mut enrollment.backup_codes;
            match TotpSecret::parse(enrollment.secret.expose_secret()) {
                Ok(secret) => guard.verify(
                    context,
                    SecondFactor::Either {
                        secret: &secret,
                        codes,
                        code,
                    },
                    now,
                ),
                Err(err) => {
                    debug!("stored secret unusable, checking backup codes only: {err}");
                    guard.verify(context, SecondFactor::Backup { codes, code }, now)
                }
            }
        })
        .await;

    let result: Result<(), SecurityError> =
        outcome.unwrap_or_else(|| Err(guard.reject(context, "not_enrolled", now)));

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => security_error_response(&err),
    }
}
