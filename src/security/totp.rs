//! Time-based one-time passwords (RFC 6238 over RFC 4226 HOTP).
//!
//! HMAC-SHA1, 30 second steps, 6 digits. Secrets are base32 strings and the
//! HMAC key is their decoded bytes, which is what authenticator apps expect
//! from the provisioning URI.
//!
//! Every time-dependent function takes the unix time explicitly. Drift is
//! tolerated by shifting the step counter, never by re-reading the clock.

use super::backup_codes::{self, BackupCodeSet};
use super::error::{Result, SecurityError};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::debug;

pub const DEFAULT_ISSUER: &str = "SkyShip";
pub const SECRET_LEN: usize = 32;
pub const CODE_DIGITS: usize = 6;
pub const TIME_STEP_SECONDS: u64 = 30;
pub const DEFAULT_WINDOW: u64 = 1;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Base32 shared secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret(String);

impl TotpSecret {
    /// Accept a base32 secret as typed by a user: surrounding whitespace is
    /// dropped and letters are upper-cased.
    ///
    /// # Errors
    /// Returns `SecurityError::Parse` if the value is empty or contains
    /// characters outside `A-Z2-7`.
    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(SecurityError::Parse("empty TOTP secret".to_string()));
        }
        if !normalized.bytes().all(|ch| BASE32_ALPHABET.contains(&ch)) {
            return Err(SecurityError::Parse(
                "TOTP secret is not base32".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decoded key bytes used for the HMAC.
    fn key_bytes(&self) -> Result<Vec<u8>> {
        Secret::Encoded(self.0.clone())
            .to_bytes()
            .map_err(|err| SecurityError::Parse(format!("TOTP secret does not decode: {err:?}")))
    }

    /// Single-step generator; skew is applied by the caller over counters.
    fn totp(&self) -> Result<TOTP> {
        Ok(TOTP::new_unchecked(
            Algorithm::SHA1,
            CODE_DIGITS,
            0,
            TIME_STEP_SECONDS,
            self.key_bytes()?,
        ))
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpSecret(***)")
    }
}

#[derive(Clone, Debug)]
pub struct AuthenticatorCodeService {
    issuer: String,
}

impl Default for AuthenticatorCodeService {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUER)
    }
}

impl AuthenticatorCodeService {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Fresh 160-bit secret from the OS random source.
    #[must_use]
    pub fn generate_secret(&self) -> TotpSecret {
        generate_secret_with_rng(&mut OsRng)
    }

    /// `otpauth://` URI for authenticator-app enrollment.
    #[must_use]
    pub fn provisioning_uri(&self, account_label: &str, secret: &TotpSecret) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        let account = urlencoding::encode(account_label);
        let secret = urlencoding::encode(secret.as_str());
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={CODE_DIGITS}&period={TIME_STEP_SECONDS}"
        )
    }

    /// Code for the step containing `unix_time`.
    ///
    /// # Errors
    /// Returns `SecurityError::Parse` if the secret does not decode.
    pub fn current_code(&self, secret: &TotpSecret, unix_time: u64) -> Result<String> {
        self.code_at_counter(secret, unix_time / TIME_STEP_SECONDS)
    }

    /// HOTP value for an explicit step counter.
    ///
    /// # Errors
    /// Returns `SecurityError::Parse` if the secret does not decode.
    pub fn code_at_counter(&self, secret: &TotpSecret, counter: u64) -> Result<String> {
        Ok(secret.totp()?.generate(counter.saturating_mul(TIME_STEP_SECONDS)))
    }

    /// Whether `submitted` matches the code of any step within `window`
    /// steps of `now`.
    ///
    /// Anything other than exactly six ASCII digits is rejected before any
    /// code is computed.
    #[must_use]
    pub fn validate_code(
        &self,
        secret: &TotpSecret,
        submitted: &str,
        window: u64,
        now: u64,
    ) -> bool {
        if !is_code_shaped(submitted) {
            debug!("rejecting malformed TOTP submission");
            return false;
        }

        let totp = match secret.totp() {
            Ok(totp) => totp,
            Err(err) => {
                debug!("TOTP validation failed: {err}");
                return false;
            }
        };

        let current = now / TIME_STEP_SECONDS;
        let first = current.saturating_sub(window);
        let last = current.saturating_add(window);

        (first..=last).any(|counter| {
            let expected = totp.generate(counter.saturating_mul(TIME_STEP_SECONDS));
            bool::from(expected.as_bytes().ct_eq(submitted.as_bytes()))
        })
    }

    /// `count` single-use recovery codes.
    #[must_use]
    pub fn generate_backup_codes(&self, count: usize) -> BackupCodeSet {
        BackupCodeSet::generate(count)
    }

    /// Remove `submitted` from `owned` if present (case-insensitive).
    pub fn consume_backup_code(&self, owned: &mut BackupCodeSet, submitted: &str) -> bool {
        owned.consume(submitted)
    }
}

/// Six ASCII digits, nothing else.
#[must_use]
pub fn is_code_shaped(value: &str) -> bool {
    value.len() == CODE_DIGITS && value.bytes().all(|ch| ch.is_ascii_digit())
}

fn generate_secret_with_rng<R: RngCore>(rng: &mut R) -> TotpSecret {
    TotpSecret(backup_codes::random_string(rng, BASE32_ALPHABET, SECRET_LEN))
}
