//! Security core: IP admission control, TOTP second factor and the audit
//! trail with brute-force lockout.
//!
//! Components are plain service objects. Time, storage and the audit
//! forwarding transport are injected so nothing here reaches for process
//! globals.

pub mod access;
pub mod audit;
pub mod backup_codes;
pub mod cidr;
pub mod clock;
pub mod error;
pub mod login;
pub mod sink;
pub mod store;
pub mod totp;

pub use access::{AccessGate, AccessPolicy};
pub use audit::{AuditExport, AuditLog, LoginAttempt, SecurityEvent};
pub use backup_codes::BackupCodeSet;
pub use cidr::{cidr_contains, CidrBlock};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SecurityError;
pub use login::{LoginContext, LoginGuard, SecondFactor};
pub use sink::{AuditRecord, AuditSink, HttpAuditSink, NoopAuditSink};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use totp::{AuthenticatorCodeService, TotpSecret};
