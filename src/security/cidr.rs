//! IPv4 CIDR ranges and containment checks.
//!
//! Containment is `(address & mask) == (base & mask)` where `mask` has the
//! high-order `prefix_len` bits set. IPv6 is not handled here; callers only
//! exact-match non-IPv4 literals.

use super::error::{Result, SecurityError};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::warn;

pub const MAX_PREFIX_LEN: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    base: u32,
    prefix_len: u8,
}

impl CidrBlock {
    /// # Errors
    /// Returns `SecurityError::Parse` if `prefix_len` is greater than 32.
    pub fn new(base: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > MAX_PREFIX_LEN {
            return Err(SecurityError::Parse(format!(
                "prefix length {prefix_len} out of range 0..=32"
            )));
        }
        Ok(Self {
            base: u32::from(base),
            prefix_len,
        })
    }

    /// Parse `a.b.c.d/n`.
    ///
    /// # Errors
    /// Returns `SecurityError::Parse` on a missing `/`, a bad dotted quad or a
    /// prefix outside `0..=32`.
    pub fn parse(value: &str) -> Result<Self> {
        let (address, prefix) = value
            .trim()
            .split_once('/')
            .ok_or_else(|| SecurityError::Parse(format!("missing prefix length in {value:?}")))?;

        let base = parse_ipv4(address)?;
        let prefix_len = prefix
            .parse::<u8>()
            .map_err(|_| SecurityError::Parse(format!("invalid prefix length in {value:?}")))?;

        Self::new(Ipv4Addr::from(base), prefix_len)
    }

    #[must_use]
    pub fn base(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    #[must_use]
    pub fn mask(&self) -> u32 {
        prefix_mask(self.prefix_len)
    }

    #[must_use]
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.contains_u32(u32::from(address))
    }

    #[must_use]
    pub fn contains_u32(&self, address: u32) -> bool {
        let mask = self.mask();
        address & mask == self.base & mask
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base(), self.prefix_len)
    }
}

impl FromStr for CidrBlock {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// High-order `prefix_len` bits set. Callers guarantee `prefix_len <= 32`.
fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n if n >= MAX_PREFIX_LEN => u32::MAX,
        n => u32::MAX << (MAX_PREFIX_LEN - n),
    }
}

/// Parse a dotted quad into its 32-bit value.
///
/// # Errors
/// Returns `SecurityError::Parse` unless `value` is exactly four
/// dot-separated decimal octets.
pub fn parse_ipv4(value: &str) -> Result<u32> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| SecurityError::Parse(format!("invalid IPv4 address {value:?}")))
}

/// Whether `address` falls inside `cidr`.
///
/// Malformed input on either side is logged and treated as no match.
pub fn cidr_contains(address: &str, cidr: &str) -> bool {
    let block = match CidrBlock::parse(cidr) {
        Ok(block) => block,
        Err(err) => {
            warn!(cidr, "ignoring range: {err}");
            return false;
        }
    };

    match parse_ipv4(address) {
        Ok(address) => block.contains_u32(address),
        Err(err) => {
            warn!(address, "range check skipped: {err}");
            false
        }
    }
}
