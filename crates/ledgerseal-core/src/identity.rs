//! Identity addresses.
//!
//! An identity is the address form of a public key: `0x` followed by the
//! hex encoding of the first 20 bytes of the Blake3 hash of an Ed25519
//! public key. The wallet owns the key; Ledgerseal only ever references
//! the address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::{CoreError, Result};

/// Number of address bytes kept from the public key hash.
pub const ADDRESS_LEN: usize = 20;

/// A public-key-derived address, normalized to lower case.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Derive the identity address for a public key.
    pub fn from_public_key(public_key: &Ed25519PublicKey) -> Self {
        let hash = Blake3Hash::hash(public_key.as_bytes());
        Self(format!("0x{}", hex::encode(&hash.as_bytes()[..ADDRESS_LEN])))
    }

    /// Parse an address string. Mixed case is accepted and normalized.
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| CoreError::InvalidIdentity(s.to_string()))?;

        if digits.len() != ADDRESS_LEN * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidIdentity(s.to_string()));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// The address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address bytes as fed into derivations.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_accepts_any_address_bytes(bytes in any::<[u8; 20]>()) {
            let text = format!("0x{}", hex::encode_upper(bytes));
            let identity = Identity::parse(&text).unwrap();
            prop_assert_eq!(identity.as_str(), format!("0x{}", hex::encode(bytes)));
        }
    }

    #[test]
    fn test_identity_from_public_key_shape() {
        let identity = Identity::from_public_key(&Keypair::generate().public_key());
        assert!(identity.as_str().starts_with("0x"));
        assert_eq!(identity.as_str().len(), 2 + ADDRESS_LEN * 2);
        assert_eq!(Identity::parse(identity.as_str()).unwrap(), identity);
    }

    #[test]
    fn test_identity_deterministic() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        assert_eq!(
            Identity::from_public_key(&keypair.public_key()),
            Identity::from_public_key(&keypair.public_key())
        );
    }

    #[test]
    fn test_parse_normalizes_case() {
        let upper = Identity::parse("0xABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
        let lower = Identity::parse("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "0x", "abcdef0123456789abcdef0123456789abcdef01", "0x1234", "0xzz"] {
            assert!(matches!(Identity::parse(bad), Err(CoreError::InvalidIdentity(_))));
        }
    }
}
