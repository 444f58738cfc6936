//! Single-use backup codes for when the authenticator app is unavailable.

use rand::{rngs::OsRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKUP_CODE_COUNT: usize = 8;
pub const BACKUP_CODE_LEN: usize = 6;
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Codes still available to one principal. A code in the set has never been
/// used; consuming it removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupCodeSet {
    codes: Vec<String>,
}

impl BackupCodeSet {
    /// `count` codes from the OS random source.
    #[must_use]
    pub fn generate(count: usize) -> Self {
        Self::generate_with_rng(&mut OsRng, count)
    }

    fn generate_with_rng<R: RngCore>(rng: &mut R, count: usize) -> Self {
        let codes = (0..count)
            .map(|_| random_string(rng, BACKUP_CODE_ALPHABET, BACKUP_CODE_LEN))
            .collect();
        Self { codes }
    }

    #[must_use]
    pub fn from_codes(codes: Vec<String>) -> Self {
        Self { codes }
    }

    /// Case-insensitive match; removes the code on success.
    pub fn consume(&mut self, submitted: &str) -> bool {
        let normalized = normalize_backup_code(submitted);
        if normalized.is_empty() {
            return false;
        }

        match self
            .codes
            .iter()
            .position(|code| code.eq_ignore_ascii_case(&normalized))
        {
            Some(index) => {
                self.codes.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Trim and upper-case user input.
#[must_use]
pub fn normalize_backup_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// `len` characters drawn uniformly from `alphabet`.
pub(crate) fn random_string<R: RngCore>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .filter_map(|_| alphabet.get(rng.gen_range(0..alphabet.len())))
        .map(|&ch| char::from(ch))
        .collect()
}
