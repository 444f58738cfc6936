//! Administrative endpoints: access policy, audit trail and MFA enrollment.
//!
//! Every route here sits behind [`admin_gate`].

use super::{error_response, normalize_email, security_error_response, valid_email, ClientMeta};
use crate::security::{
    backup_codes::DEFAULT_BACKUP_CODE_COUNT, AccessPolicy, AuditExport, LoginAttempt,
    SecurityEvent,
};
use crate::skyship::state::{AppState, Enrollment};
use axum::{
    extract::{Extension, Query, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_LIST_LIMIT: usize = 100;

const ADMIN_ROLE: &str = "admin";

fn admin_event(
    client: &ClientMeta,
    action: &str,
    resource: &str,
    success: bool,
    details: Option<String>,
) -> SecurityEvent {
    let mut event = SecurityEvent::new(action, resource, success);
    event.principal_role = ADMIN_ROLE.to_string();
    event.source_address = client.address_or_unknown().to_string();
    event.user_agent.clone_from(&client.user_agent);
    event.details = details;
    event
}

/// Reject callers whose address the access policy does not admit.
///
/// Denials are answered with `403` and recorded as failed security events.
/// When no address can be resolved the request is only let through if the
/// policy would not gate admin routes at all.
pub async fn admin_gate(request: Request, next: Next) -> Response {
    let Some(state) = request.extensions().get::<Arc<AppState>>().cloned() else {
        error!("admin gate invoked without application state");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
    };

    let client = ClientMeta::from_parts(request.headers(), request.extensions());
    let allowed = match client.address.as_deref() {
        Some(address) => state.gate.can_access_admin_route(address),
        None => {
            let policy = state.gate.get_policy();
            !policy.enabled || !policy.admin_only
        }
    };

    if allowed {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    warn!(address = client.address_or_unknown(), path, "admin access denied");
    state
        .audit
        .record_event(admin_event(&client, "admin.access_denied", &path, false, None));

    error_response(StatusCode::FORBIDDEN, "forbidden")
}

#[instrument(skip(state))]
pub async fn get_policy(Extension(state): Extension<Arc<AppState>>) -> Json<AccessPolicy> {
    Json(state.gate.get_policy())
}

#[instrument(skip(state, policy))]
pub async fn put_policy(
    Extension(state): Extension<Arc<AppState>>,
    client: ClientMeta,
    Json(policy): Json<AccessPolicy>,
) -> Response {
    let summary = format!(
        "enabled={} whitelist={} admin_only={} addresses={} ranges={}",
        policy.enabled,
        policy.whitelist_mode,
        policy.admin_only,
        policy.allowed_addresses.len(),
        policy.allowed_ranges.len()
    );

    let result = state.gate.set_policy(policy);
    state.audit.record_event(admin_event(
        &client,
        "policy.update",
        "access-policy",
        result.is_ok(),
        Some(summary),
    ));

    match result {
        Ok(()) => (StatusCode::OK, Json(state.gate.get_policy())).into_response(),
        Err(err) => {
            error!("access policy update not persisted: {err}");
            security_error_response(&err)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

impl ListParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

#[instrument(skip(state))]
pub async fn security_events(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<SecurityEvent>> {
    Json(state.audit.security_events(params.limit()))
}

#[instrument(skip(state))]
pub async fn login_attempts(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<LoginAttempt>> {
    Json(state.audit.login_attempts(params.limit()))
}

#[instrument(skip(state))]
pub async fn export_logs(
    Extension(state): Extension<Arc<AppState>>,
    client: ClientMeta,
) -> Json<AuditExport> {
    let export = state.audit.export_logs();
    state
        .audit
        .record_event(admin_event(&client, "logs.export", "security-logs", true, None));
    Json(export)
}

#[instrument(skip(state))]
pub async fn clear_logs(
    Extension(state): Extension<Arc<AppState>>,
    client: ClientMeta,
) -> StatusCode {
    state.audit.clear_logs();
    info!(address = client.address_or_unknown(), "security logs cleared");
    // First entry of the fresh trail records who cleared it.
    state
        .audit
        .record_event(admin_event(&client, "logs.clear", "security-logs", true, None));
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

/// Issue a new TOTP secret and backup codes for an account, replacing any
/// previous enrollment. The plaintext material is only returned here.
#[instrument(skip(state))]
pub async fn enroll(
    Extension(state): Extension<Arc<AppState>>,
    client: ClientMeta,
    Json(request): Json<EnrollRequest>,
) -> Response {
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "invalid email");
    }

    let codes = state.guard.codes();
    let secret = codes.generate_secret();
    let provisioning_uri = codes.provisioning_uri(&email, &secret);
    let backup_codes = codes.generate_backup_codes(DEFAULT_BACKUP_CODE_COUNT);

    let response = EnrollResponse {
        secret: secret.as_str().to_string(),
        provisioning_uri,
        backup_codes: backup_codes.codes().to_vec(),
    };

    state
        .enrollments
        .insert(
            &email,
            Enrollment {
                secret: SecretString::from(secret.as_str().to_string()),
                backup_codes,
            },
        )
        .await;

    let mut event = admin_event(&client, "mfa.enroll", "auth/mfa", true, None);
    event.principal_email = email;
    state.audit.record_event(event);

    (StatusCode::CREATED, Json(response)).into_response()
}
