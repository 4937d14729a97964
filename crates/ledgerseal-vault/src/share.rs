//! Sealed key shares via X25519 key agreement.
//!
//! For recipients that publish an X25519 public key, a resource key can be
//! sealed so that only the holder of the matching secret opens it. The
//! sender uses a one-time ephemeral key; the derived wrap key is bound to
//! the resource name.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::cipher::ResourceKey;
use crate::error::{CipherError, Result, UnwrapError, VaultError};

const SEAL_KEY_CONTEXT: &str = "ledgerseal 2024-05 sealed key share v1";

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret held by a share recipient.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }
}

impl std::fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("X25519StaticSecret(..)")
    }
}

/// A resource key sealed to one X25519 recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Resource the key belongs to; bound into the wrap key derivation.
    pub resource: String,

    /// Sender's ephemeral public key.
    pub ephemeral_public: X25519PublicKey,

    /// ChaCha20-Poly1305 nonce.
    pub nonce: [u8; 12],

    /// The encrypted resource key (includes the authentication tag).
    pub encrypted_key: Vec<u8>,
}

impl SealedKey {
    /// Seal `key` for the holder of `recipient`'s secret.
    pub fn seal(
        resource: &str,
        key: &ResourceKey,
        recipient: &X25519PublicKey,
    ) -> std::result::Result<Self, CipherError> {
        let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
        let ephemeral_public = X25519PublicKey::from(PublicKey::from(&ephemeral));
        let shared = ephemeral.diffie_hellman(&recipient.to_dalek());

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = seal_cipher(shared.as_bytes(), resource)?;
        let encrypted_key = cipher
            .encrypt(Nonce::from_slice(&nonce), key.as_bytes().as_slice())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        Ok(Self {
            resource: resource.to_string(),
            ephemeral_public,
            nonce,
            encrypted_key,
        })
    }

    /// Open the share with the recipient's secret.
    pub fn open(
        &self,
        recipient_secret: &X25519StaticSecret,
    ) -> std::result::Result<ResourceKey, UnwrapError> {
        let shared = recipient_secret
            .0
            .diffie_hellman(&self.ephemeral_public.to_dalek());

        let cipher = seal_cipher(shared.as_bytes(), &self.resource)
            .map_err(|e| UnwrapError::Corrupted(e.to_string()))?;
        let key_bytes = cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.encrypted_key.as_slice())
            .map_err(|_| UnwrapError::WrongSecret)?;

        ResourceKey::from_slice(&key_bytes)
            .map_err(|_| UnwrapError::InvalidKeyLength(key_bytes.len()))
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

fn seal_cipher(shared: &[u8; 32], resource: &str) -> std::result::Result<ChaCha20Poly1305, CipherError> {
    let mut hasher = blake3::Hasher::new_derive_key(SEAL_KEY_CONTEXT);
    hasher.update(shared);
    hasher.update(resource.as_bytes());
    ChaCha20Poly1305::new_from_slice(hasher.finalize().as_bytes())
        .map_err(|e| CipherError::Encryption(e.to_string()))
}
