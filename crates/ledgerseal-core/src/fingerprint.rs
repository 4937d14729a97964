//! Resource fingerprints.
//!
//! The ledger only ever receives one-way hashes of the ciphertext and of
//! the initialization vector. Plaintext, keys and full ciphertext stay
//! local.

use serde::{Deserialize, Serialize};

use crate::crypto::Blake3Hash;

/// One-way fingerprint of an encrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceFingerprint {
    /// Hash of the ciphertext bytes.
    pub ciphertext: Blake3Hash,
    /// Hash of the initialization vector.
    pub iv: Blake3Hash,
}

impl ResourceFingerprint {
    /// Fingerprint a ciphertext and its IV.
    pub fn compute(ciphertext: &[u8], iv: &[u8]) -> Self {
        Self {
            ciphertext: Blake3Hash::hash(ciphertext),
            iv: Blake3Hash::hash(iv),
        }
    }

    /// Check that a ciphertext/IV pair still matches this fingerprint.
    pub fn matches(&self, ciphertext: &[u8], iv: &[u8]) -> bool {
        let other = Self::compute(ciphertext, iv);
        self.ciphertext.ct_eq(&other.ciphertext) && self.iv.ct_eq(&other.iv)
    }
}
