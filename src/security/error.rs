//! Error taxonomy for the security core.
//!
//! Nothing here is fatal to the host process. `Validation` and `Lockout`
//! render generic messages so callers can forward them to clients as-is.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    /// Persisted configuration could not be read, parsed or written.
    #[error("configuration error: {0}")]
    Config(String),
    /// An IP literal or CIDR string was malformed.
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid code")]
    Validation,
    #[error("too many attempts")]
    Lockout,
}

pub type Result<T, E = SecurityError> = std::result::Result<T, E>;
