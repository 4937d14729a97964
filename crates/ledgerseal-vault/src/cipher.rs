//! AES-256-CBC payload encryption.
//!
//! Every call to [`SymmetricCipher::encrypt`] draws a fresh random IV, so
//! encrypting the same plaintext twice never yields the same ciphertext.

use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use ledgerseal_core::ResourceFingerprint;

use crate::error::CipherError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// IV length in bytes (one AES block).
pub const IV_LEN: usize = 16;

/// A 256-bit symmetric key bound to one resource.
#[derive(Clone)]
pub struct ResourceKey([u8; KEY_LEN]);

impl ResourceKey {
    /// Generate a new key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for ResourceKey {}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResourceKey(..)")
    }
}

/// A 128-bit CBC initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationVector(pub [u8; IV_LEN]);

impl InitializationVector {
    /// Generate a new random IV.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Ciphertext plus the IV needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// PKCS#7-padded AES-256-CBC ciphertext.
    pub ciphertext: Bytes,

    /// IV used for this encryption.
    pub iv: InitializationVector,
}

impl EncryptedPayload {
    /// One-way fingerprint submitted to the ledger.
    pub fn fingerprint(&self) -> ResourceFingerprint {
        ResourceFingerprint::compute(&self.ciphertext, self.iv.as_bytes())
    }

    /// Size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

/// AES-256-CBC with PKCS#7 padding.
pub struct SymmetricCipher;

impl SymmetricCipher {
    /// Encrypt `plaintext` under `key` with a fresh random IV.
    pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<EncryptedPayload, CipherError> {
        Self::encrypt_with_iv(plaintext, key, InitializationVector::generate())
    }

    /// Encrypt with a caller-chosen IV. The IV must never repeat under the
    /// same key.
    pub(crate) fn encrypt_with_iv(
        plaintext: &[u8],
        key: &[u8],
        iv: InitializationVector,
    ) -> Result<EncryptedPayload, CipherError> {
        check_key_len(key)?;

        let ciphertext = Aes256CbcEnc::new_from_slices(key, iv.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        Ok(EncryptedPayload {
            ciphertext: Bytes::from(ciphertext),
            iv,
        })
    }

    /// Decrypt `payload` under `key`.
    pub fn decrypt(payload: &EncryptedPayload, key: &[u8]) -> Result<Vec<u8>, CipherError> {
        check_key_len(key)?;

        Aes256CbcDec::new_from_slices(key, payload.iv.as_bytes())
            .map_err(|_| CipherError::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(&payload.ciphertext)
            .map_err(|_| CipherError::Decryption)
    }
}

fn check_key_len(key: &[u8]) -> Result<(), CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = ResourceKey::generate();
        let payload = SymmetricCipher::encrypt(b"patient data", key.as_bytes()).unwrap();

        assert_ne!(payload.ciphertext.as_ref(), b"patient data");
        let decrypted = SymmetricCipher::decrypt(&payload, key.as_bytes()).unwrap();
        assert_eq!(decrypted, b"patient data");
    }

    #[test]
    fn test_encryption_is_not_deterministic() {
        let key = ResourceKey::generate();
        let a = SymmetricCipher::encrypt(b"same input", key.as_bytes()).unwrap();
        let b = SymmetricCipher::encrypt(b"same input", key.as_bytes()).unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_ciphertext_is_block_padded() {
        let key = ResourceKey::generate();
        let empty = SymmetricCipher::encrypt(b"", key.as_bytes()).unwrap();
        let full_block = SymmetricCipher::encrypt(&[0u8; 16], key.as_bytes()).unwrap();

        assert_eq!(empty.ciphertext_len(), 16);
        assert_eq!(full_block.ciphertext_len(), 32);
    }

    #[test]
    fn test_invalid_key_length() {
        let err = SymmetricCipher::encrypt(b"data", &[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CipherError::InvalidKeyLength { expected: 32, actual: 16 }
        ));
    }

    #[test]
    fn test_wrong_key_or_tampering_is_opaque() {
        let key = ResourceKey::generate();
        let mut payload = SymmetricCipher::encrypt(b"secret", key.as_bytes()).unwrap();

        // Truncated ciphertext cannot be unpadded.
        let truncated = EncryptedPayload {
            ciphertext: payload.ciphertext.slice(..8),
            iv: payload.iv,
        };
        assert!(matches!(
            SymmetricCipher::decrypt(&truncated, key.as_bytes()),
            Err(CipherError::Decryption)
        ));

        // A wrong key either fails with the same opaque error or yields
        // something other than the plaintext.
        let other = ResourceKey::generate();
        match SymmetricCipher::decrypt(&payload, other.as_bytes()) {
            Err(e) => assert!(matches!(e, CipherError::Decryption)),
            Ok(garbage) => assert_ne!(garbage, b"secret"),
        }

        payload.iv.0[0] ^= 0xff;
        assert_ne!(
            SymmetricCipher::decrypt(&payload, key.as_bytes()).ok(),
            Some(b"secret".to_vec())
        );
    }

    #[test]
    fn test_fingerprint_tracks_payload() {
        let key = ResourceKey::generate();
        let payload = SymmetricCipher::encrypt(b"data", key.as_bytes()).unwrap();
        let fp = payload.fingerprint();

        assert!(fp.matches(&payload.ciphertext, payload.iv.as_bytes()));
    }

    #[test]
    fn test_resource_key_debug_hides_material() {
        let key = ResourceKey::from_bytes([0xab; 32]);
        assert_eq!(format!("{:?}", key), "ResourceKey(..)");
    }

    proptest! {
        #[test]
        fn roundtrip_any_payload(plaintext in prop::collection::vec(any::<u8>(), 0..512), key in any::<[u8; 32]>()) {
            let payload = SymmetricCipher::encrypt(&plaintext, &key).unwrap();
            prop_assert_eq!(SymmetricCipher::decrypt(&payload, &key).unwrap(), plaintext);
        }
    }
}
