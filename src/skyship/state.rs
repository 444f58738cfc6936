//! Shared server state: the security core plus the enrollment registry.

use crate::cli::globals::GlobalArgs;
use crate::security::{
    AccessGate, AuditLog, AuditSink, AuthenticatorCodeService, BackupCodeSet, Clock, FileStore,
    HttpAuditSink, KeyValueStore, LoginGuard, MemoryStore, NoopAuditSink, SystemClock,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// MFA material for one account. Lives only in memory.
#[derive(Debug)]
pub struct Enrollment {
    pub secret: SecretString,
    pub backup_codes: BackupCodeSet,
}

#[derive(Debug, Default)]
pub struct EnrollmentRegistry {
    entries: Mutex<HashMap<String, Enrollment>>,
}

impl EnrollmentRegistry {
    /// Replaces any previous enrollment for `email`.
    pub async fn insert(&self, email: &str, enrollment: Enrollment) {
        self.entries.lock().await.insert(email.to_string(), enrollment);
    }

    /// Run `f` against the enrollment for `email`, if any.
    pub async fn with_enrollment<T>(
        &self,
        email: &str,
        f: impl FnOnce(&mut Enrollment) -> T,
    ) -> Option<T> {
        let mut entries = self.entries.lock().await;
        entries.get_mut(email).map(f)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub audit: Arc<AuditLog>,
    pub guard: LoginGuard,
    pub enrollments: EnrollmentRegistry,
    pub clock: Arc<dyn Clock>,
    pub trust_proxy_headers: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gate", &self.gate)
            .field("audit", &self.audit)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state from explicit parts. Used by tests and by [`Self::from_globals`].
    #[must_use]
    pub fn new(
        gate: AccessGate,
        audit: AuditLog,
        codes: AuthenticatorCodeService,
        clock: Arc<dyn Clock>,
        trust_proxy_headers: bool,
    ) -> Self {
        let audit = Arc::new(audit);
        Self {
            gate: Arc::new(gate),
            guard: LoginGuard::new(codes, audit.clone()),
            audit,
            enrollments: EnrollmentRegistry::default(),
            clock,
            trust_proxy_headers,
        }
    }

    /// Build state from command line configuration.
    ///
    /// # Errors
    /// Returns an error if the security log client cannot be created.
    pub fn from_globals(globals: &GlobalArgs) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match &globals.policy_store {
            Some(path) => {
                info!("Access policy store: {}", path.display());
                Arc::new(FileStore::new(path))
            }
            None => {
                info!("Access policy store: in-memory");
                Arc::new(MemoryStore::new())
            }
        };

        let sink: Arc<dyn AuditSink> = match &globals.security_log_url {
            Some(url) => {
                info!("Forwarding audit records to {url}");
                Arc::new(
                    HttpAuditSink::new(url.clone(), globals.security_log_timeout)
                        .context("Failed to build security log client")?,
                )
            }
            None => Arc::new(NoopAuditSink),
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit = AuditLog::new(globals.audit_capacity, clock.clone(), sink);

        Ok(Self::new(
            AccessGate::with_store(store),
            audit,
            AuthenticatorCodeService::new(globals.issuer.clone()),
            clock,
            globals.trust_proxy_headers,
        ))
    }
}
