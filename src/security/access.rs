//! IP-based admission control.
//!
//! An [`AccessGate`] owns the active [`AccessPolicy`] and answers whether a
//! source address may proceed. Policies are immutable once installed;
//! `set_policy` swaps the whole value so readers see either the old or the
//! new policy, never a mix.
//!
//! Evaluation order for `is_allowed`:
//!
//! 1. Disabled policy: allow.
//! 2. Exact match in `allowed_addresses`: `whitelist_mode`.
//! 3. IPv4 address inside any `allowed_ranges` block: `whitelist_mode`.
//! 4. Otherwise: `!whitelist_mode`.
//!
//! Malformed addresses or ranges never match.

use super::cidr::{parse_ipv4, CidrBlock};
use super::error::{Result, SecurityError};
use super::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Key under which the policy JSON is persisted.
pub const POLICY_STORE_KEY: &str = "skyship.access_policy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessPolicy {
    pub enabled: bool,
    #[serde(rename = "allowedIPs")]
    pub allowed_addresses: BTreeSet<String>,
    /// CIDR strings (`a.b.c.d/n`), evaluated in order.
    pub allowed_ranges: Vec<String>,
    pub whitelist_mode: bool,
    pub admin_only: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_addresses: BTreeSet::new(),
            allowed_ranges: Vec::new(),
            whitelist_mode: true,
            admin_only: true,
        }
    }
}

impl AccessPolicy {
    /// Decode a persisted policy.
    ///
    /// # Errors
    /// Returns `SecurityError::Config` if `raw` is not a policy object.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| SecurityError::Config(format!("malformed access policy: {err}")))
    }

    /// # Errors
    /// Returns `SecurityError::Config` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| SecurityError::Config(format!("failed to encode access policy: {err}")))
    }
}

/// A policy with its ranges parsed once at install time.
#[derive(Debug)]
struct CompiledPolicy {
    policy: AccessPolicy,
    ranges: Vec<CidrBlock>,
}

impl CompiledPolicy {
    fn compile(policy: AccessPolicy) -> Self {
        let ranges = policy
            .allowed_ranges
            .iter()
            .filter_map(|range| match CidrBlock::parse(range) {
                Ok(block) => Some(block),
                Err(err) => {
                    warn!(range = %range, "dropping range from access policy: {err}");
                    None
                }
            })
            .collect();

        Self { policy, ranges }
    }

    fn in_ranges(&self, address: &str) -> bool {
        if self.ranges.is_empty() {
            return false;
        }

        match parse_ipv4(address) {
            Ok(value) => self.ranges.iter().any(|block| block.contains_u32(value)),
            Err(err) => {
                if matches!(address.parse::<IpAddr>(), Ok(IpAddr::V6(_))) {
                    debug!(address, "range check skipped for IPv6 address");
                } else {
                    warn!(address, "range check skipped: {err}");
                }
                false
            }
        }
    }

    fn is_allowed(&self, address: &str) -> bool {
        let policy = &self.policy;
        if !policy.enabled {
            return true;
        }

        let address = address.trim();
        if policy.allowed_addresses.contains(address) || self.in_ranges(address) {
            return policy.whitelist_mode;
        }

        !policy.whitelist_mode
    }
}

pub struct AccessGate {
    active: RwLock<Arc<CompiledPolicy>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("policy", &self.get_policy())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(AccessPolicy::default())
    }
}

impl AccessGate {
    /// In-memory gate; policy updates are not persisted.
    #[must_use]
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            active: RwLock::new(Arc::new(CompiledPolicy::compile(policy))),
            store: None,
        }
    }

    /// Load the persisted policy once and write back on every update.
    ///
    /// An absent, unreadable or malformed stored value falls back to
    /// [`AccessPolicy::default`].
    #[must_use]
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        let policy = match store.get(POLICY_STORE_KEY) {
            Ok(Some(raw)) => AccessPolicy::from_json(&raw).unwrap_or_else(|err| {
                warn!("using default access policy: {err}");
                AccessPolicy::default()
            }),
            Ok(None) => {
                info!("no stored access policy, using default");
                AccessPolicy::default()
            }
            Err(err) => {
                warn!("using default access policy: {err}");
                AccessPolicy::default()
            }
        };

        Self {
            active: RwLock::new(Arc::new(CompiledPolicy::compile(policy))),
            store: Some(store),
        }
    }

    fn snapshot(&self) -> Arc<CompiledPolicy> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active policy.
    ///
    /// The in-memory swap always happens; a configured store is then
    /// updated.
    ///
    /// # Errors
    /// Returns `SecurityError::Config` if persisting the policy fails.
    pub fn set_policy(&self, policy: AccessPolicy) -> Result<()> {
        let compiled = Arc::new(CompiledPolicy::compile(policy));
        let encoded = compiled.policy.to_json();

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = compiled;

        info!("access policy replaced");

        if let Some(store) = &self.store {
            store.set(POLICY_STORE_KEY, &encoded?).inspect_err(|err| {
                warn!("access policy not persisted: {err}");
            })?;
        }

        Ok(())
    }

    #[must_use]
    pub fn get_policy(&self) -> AccessPolicy {
        self.snapshot().policy.clone()
    }

    #[must_use]
    pub fn is_allowed(&self, address: &str) -> bool {
        self.snapshot().is_allowed(address)
    }

    #[must_use]
    pub fn can_access_admin_route(&self, address: &str) -> bool {
        let compiled = self.snapshot();
        if !compiled.policy.admin_only {
            return true;
        }
        compiled.is_allowed(address)
    }
}
