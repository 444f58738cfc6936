//! # SkyShip security service
//!
//! Access control and audit backend for the SkyShip freight portal. The
//! marketing pages and admin dashboard are served elsewhere; this crate owns
//! the decisions they depend on.
//!
//! ## Admission (`security::access`)
//!
//! An [`security::AccessGate`] evaluates a source address against the active
//! access policy: exact IP literals plus IPv4 CIDR ranges, in whitelist or
//! blacklist mode. Admin routes consult the gate when the policy is marked
//! `adminOnly`. Malformed addresses and ranges never match.
//!
//! ## Second factor (`security::totp`)
//!
//! RFC 6238 TOTP (HMAC-SHA1, 30s, 6 digits) with explicit time arguments and
//! shifted-counter drift tolerance, plus single-use backup codes.
//!
//! ## Audit (`security::audit`)
//!
//! Bounded in-memory buffers of security events and login attempts. Five
//! failed attempts from one address within fifteen minutes lock that address
//! out. Records are also forwarded, best effort, to an external endpoint.

pub mod cli;
pub mod security;
pub mod skyship;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
