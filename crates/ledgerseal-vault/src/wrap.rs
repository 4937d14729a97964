//! Wrapped resource keys.
//!
//! A [`WrappedKey`] is a resource key encrypted with [`SymmetricCipher`]
//! under a key derived from a [`WrappingSecret`], plus a Blake3 MAC over
//! `iv || ciphertext`. The MAC is checked before decryption, so unwrapping
//! with the wrong secret fails cleanly instead of producing garbage.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use ledgerseal_core::{Blake3Hash, Ed25519Signature, Identity};

use crate::cipher::{EncryptedPayload, InitializationVector, ResourceKey, SymmetricCipher};
use crate::error::{CipherError, Result, UnwrapError, VaultError};

const IDENTITY_SECRET_CONTEXT: &str = "ledgerseal 2024-05 wrapping secret from identity v1";
const SIGNATURE_SECRET_CONTEXT: &str = "ledgerseal 2024-05 wrapping secret from signature v1";
const ENCRYPTION_KEY_CONTEXT: &str = "ledgerseal 2024-05 wrapped key encryption v1";
const MAC_KEY_CONTEXT: &str = "ledgerseal 2024-05 wrapped key mac v1";

/// Fixed message a wallet signs to produce a signature-derived secret.
pub const VAULT_SECRET_MESSAGE: &[u8] = b"ledgerseal: unlock local key vault v1";

/// Secret material a wrapped key is bound to.
#[derive(Clone)]
pub struct WrappingSecret([u8; 32]);

impl WrappingSecret {
    /// Derive a secret from an identity address.
    ///
    /// The address is public, so this only obscures the key from casual
    /// inspection; anyone who knows the address can unwrap.
    pub fn from_identity(identity: &Identity) -> Self {
        Self(*Blake3Hash::derive(IDENTITY_SECRET_CONTEXT, &[identity.as_bytes()]).as_bytes())
    }

    /// Derive a secret from the holder's signature over
    /// [`vault_secret_message`]. Only the key holder can reproduce it.
    pub fn from_signature(identity: &Identity, signature: &Ed25519Signature) -> Self {
        Self(
            *Blake3Hash::derive(
                SIGNATURE_SECRET_CONTEXT,
                &[identity.as_bytes(), signature.as_bytes()],
            )
            .as_bytes(),
        )
    }

    fn encryption_key(&self) -> [u8; 32] {
        *Blake3Hash::derive(ENCRYPTION_KEY_CONTEXT, &[&self.0]).as_bytes()
    }

    fn mac(&self, iv: &InitializationVector, ciphertext: &[u8]) -> Blake3Hash {
        let mac_key = Blake3Hash::derive(MAC_KEY_CONTEXT, &[&self.0]);
        let mut input = Vec::with_capacity(iv.as_bytes().len() + ciphertext.len());
        input.extend_from_slice(iv.as_bytes());
        input.extend_from_slice(ciphertext);
        Blake3Hash::keyed(mac_key.as_bytes(), &input)
    }
}

impl std::fmt::Debug for WrappingSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WrappingSecret(..)")
    }
}

/// The message signed for [`WrappingSecret::from_signature`], bound to the
/// signing identity.
pub fn vault_secret_message(identity: &Identity) -> Vec<u8> {
    let mut message = VAULT_SECRET_MESSAGE.to_vec();
    message.push(b':');
    message.extend_from_slice(identity.as_bytes());
    message
}

/// Format identifier for wrapped keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WrapFormat {
    /// AES-256-CBC encryption, Blake3 keyed MAC over IV and ciphertext.
    Aes256CbcBlake3Mac = 1,
}

/// A resource key encrypted for one holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Wrapping algorithm used.
    pub format: WrapFormat,

    /// IV for the key ciphertext.
    pub iv: InitializationVector,

    /// The encrypted resource key.
    pub ciphertext: Bytes,

    /// MAC over `iv || ciphertext`.
    pub tag: Blake3Hash,
}

impl WrappedKey {
    /// Wrap `key` under `secret`.
    pub fn wrap(key: &ResourceKey, secret: &WrappingSecret) -> std::result::Result<Self, CipherError> {
        let payload = SymmetricCipher::encrypt(key.as_bytes(), &secret.encryption_key())?;
        let tag = secret.mac(&payload.iv, &payload.ciphertext);

        Ok(Self {
            format: WrapFormat::Aes256CbcBlake3Mac,
            iv: payload.iv,
            ciphertext: payload.ciphertext,
            tag,
        })
    }

    /// Recover the resource key with `secret`.
    pub fn unwrap(&self, secret: &WrappingSecret) -> std::result::Result<ResourceKey, UnwrapError> {
        match self.format {
            WrapFormat::Aes256CbcBlake3Mac => {
                if !secret.mac(&self.iv, &self.ciphertext).ct_eq(&self.tag) {
                    return Err(UnwrapError::WrongSecret);
                }

                let payload = EncryptedPayload {
                    ciphertext: self.ciphertext.clone(),
                    iv: self.iv,
                };
                let key_bytes = SymmetricCipher::decrypt(&payload, &secret.encryption_key())
                    .map_err(|e| UnwrapError::Corrupted(e.to_string()))?;

                ResourceKey::from_slice(&key_bytes)
                    .map_err(|_| UnwrapError::InvalidKeyLength(key_bytes.len()))
            }
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, UnwrapError> {
        ciborium::from_reader(bytes).map_err(|e| UnwrapError::Corrupted(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerseal_core::Keypair;

    fn identity() -> Identity {
        Identity::from_public_key(&Keypair::generate().public_key())
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let owner = identity();
        let key = ResourceKey::generate();
        let secret = WrappingSecret::from_identity(&owner);

        let wrapped = WrappedKey::wrap(&key, &secret).unwrap();
        assert_eq!(wrapped.unwrap(&secret).unwrap(), key);
    }

    #[test]
    fn test_wrong_identity_fails() {
        let key = ResourceKey::generate();
        let wrapped = WrappedKey::wrap(&key, &WrappingSecret::from_identity(&identity())).unwrap();

        let err = wrapped
            .unwrap(&WrappingSecret::from_identity(&identity()))
            .unwrap_err();
        assert!(matches!(err, UnwrapError::WrongSecret));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let owner = identity();
        let secret = WrappingSecret::from_identity(&owner);
        let mut wrapped = WrappedKey::wrap(&ResourceKey::generate(), &secret).unwrap();

        let mut bytes = wrapped.ciphertext.to_vec();
        bytes[0] ^= 1;
        wrapped.ciphertext = Bytes::from(bytes);

        assert!(matches!(wrapped.unwrap(&secret), Err(UnwrapError::WrongSecret)));
    }

    #[test]
    fn test_signature_secret_differs_from_identity_secret() {
        let keypair = Keypair::generate();
        let owner = Identity::from_public_key(&keypair.public_key());
        let signature = keypair.sign(&vault_secret_message(&owner));

        let key = ResourceKey::generate();
        let by_signature = WrappingSecret::from_signature(&owner, &signature);
        let wrapped = WrappedKey::wrap(&key, &by_signature).unwrap();

        assert!(wrapped.unwrap(&WrappingSecret::from_identity(&owner)).is_err());
        assert_eq!(wrapped.unwrap(&by_signature).unwrap(), key);
    }

    #[test]
    fn test_serialization() {
        let secret = WrappingSecret::from_identity(&identity());
        let wrapped = WrappedKey::wrap(&ResourceKey::generate(), &secret).unwrap();

        let recovered = WrappedKey::from_bytes(&wrapped.to_bytes().unwrap()).unwrap();
        assert_eq!(wrapped, recovered);
    }

    #[test]
    fn test_garbage_blob_is_corrupted() {
        assert!(matches!(
            WrappedKey::from_bytes(b"not cbor at all"),
            Err(UnwrapError::Corrupted(_))
        ));
    }
}
