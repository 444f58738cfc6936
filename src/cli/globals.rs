use crate::security::{
    audit::DEFAULT_AUDIT_CAPACITY, sink::DEFAULT_FORWARD_TIMEOUT, totp::DEFAULT_ISSUER,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub policy_store: Option<PathBuf>,
    pub security_log_url: Option<String>,
    pub security_log_timeout: Duration,
    pub audit_capacity: usize,
    pub issuer: String,
    pub trust_proxy_headers: bool,
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self {
            policy_store: None,
            security_log_url: None,
            security_log_timeout: DEFAULT_FORWARD_TIMEOUT,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            issuer: DEFAULT_ISSUER.to_string(),
            trust_proxy_headers: false,
        }
    }
}
