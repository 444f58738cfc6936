//! Second-factor login check composed from the code service and audit log.
//!
//! Order: lockout gate, code check, then the attempt is recorded. A locked
//! out caller gets `SecurityError::Lockout` and the attempt is logged as a
//! security event only, so hammering a locked address does not extend the
//! lockout.

use super::audit::{AuditLog, LoginAttempt, SecurityEvent};
use super::backup_codes::BackupCodeSet;
use super::error::{Result, SecurityError};
use super::totp::{is_code_shaped, AuthenticatorCodeService, TotpSecret, DEFAULT_WINDOW};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// What the caller submitted as their second factor.
#[derive(Debug)]
pub enum SecondFactor<'a> {
    Totp {
        secret: &'a TotpSecret,
        code: &'a str,
    },
    Backup {
        codes: &'a mut BackupCodeSet,
        code: &'a str,
    },
    /// A code of unknown kind: TOTP-shaped input is checked against the
    /// secret first, then every input is tried against the backup codes.
    Either {
        secret: &'a TotpSecret,
        codes: &'a mut BackupCodeSet,
        code: &'a str,
    },
}

/// Request metadata carried into audit records.
#[derive(Debug, Clone, Copy)]
pub struct LoginContext<'a> {
    pub email: &'a str,
    pub source_address: &'a str,
    pub user_agent: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct LoginGuard {
    codes: AuthenticatorCodeService,
    audit: Arc<AuditLog>,
    window: u64,
}

impl LoginGuard {
    #[must_use]
    pub fn new(codes: AuthenticatorCodeService, audit: Arc<AuditLog>) -> Self {
        Self {
            codes,
            audit,
            window: DEFAULT_WINDOW,
        }
    }

    /// Number of 30 second steps of clock drift tolerated either side.
    #[must_use]
    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn codes(&self) -> &AuthenticatorCodeService {
        &self.codes
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Lockout check shared by every login path. A hit is recorded as a
    /// `login.locked_out` security event, never as a login attempt.
    fn locked_out(&self, context: LoginContext<'_>, now: DateTime<Utc>) -> bool {
        if !self.audit.is_locked_out(context.source_address, now) {
            return false;
        }

        warn!(source_address = context.source_address, "login rejected: locked out");
        let mut event = SecurityEvent::new("login.locked_out", "auth/mfa", false);
        event.principal_email = context.email.to_string();
        event.source_address = context.source_address.to_string();
        event.user_agent = context.user_agent.map(ToString::to_string);
        self.audit.record_event(event);
        true
    }

    /// Record a failed attempt that never reached a code check, such as an
    /// unknown account. Returns the error the caller should surface.
    #[must_use]
    pub fn reject(
        &self,
        context: LoginContext<'_>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> SecurityError {
        if self.locked_out(context, now) {
            return SecurityError::Lockout;
        }

        let mut attempt = LoginAttempt::new(context.email, context.source_address, false);
        attempt.user_agent = context.user_agent.map(ToString::to_string);
        attempt.failure_reason = Some(reason.to_string());
        self.audit.record_login_attempt(attempt);
        SecurityError::Validation
    }

    /// # Errors
    /// Returns `SecurityError::Lockout` if the source address is locked out,
    /// `SecurityError::Validation` if the submitted factor does not verify.
    pub fn verify(
        &self,
        context: LoginContext<'_>,
        factor: SecondFactor<'_>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.locked_out(context, now) {
            return Err(SecurityError::Lockout);
        }

        let unix_time = u64::try_from(now.timestamp()).unwrap_or(0);
        let (verified, failure_reason) = match factor {
            SecondFactor::Totp { secret, code } => {
                let ok = self.codes.validate_code(secret, code, self.window, unix_time);
                (ok, "invalid_totp")
            }
            SecondFactor::Backup { codes, code } => {
                (self.codes.consume_backup_code(codes, code), "invalid_backup_code")
            }
            SecondFactor::Either {
                secret,
                codes,
                code,
            } => {
                let ok = (is_code_shaped(code)
                    && self.codes.validate_code(secret, code, self.window, unix_time))
                    || self.codes.consume_backup_code(codes, code);
                (ok, "invalid_code")
            }
        };

        let mut attempt = LoginAttempt::new(context.email, context.source_address, verified);
        attempt.user_agent = context.user_agent.map(ToString::to_string);
        if !verified {
            attempt.failure_reason = Some(failure_reason.to_string());
        }
        self.audit.record_login_attempt(attempt);

        if verified {
            info!(source_address = context.source_address, "second factor verified");
            Ok(())
        } else {
            Err(SecurityError::Validation)
        }
    }
}
