//! Error types for the vault.

use ledgerseal_store::StoreError;
use thiserror::Error;

/// Payload cipher failures.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key is not 256 bits.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed. Wrong key, wrong IV and bad padding are
    /// deliberately reported the same way.
    #[error("decryption failed")]
    Decryption,
}

/// Failures recovering a resource key from its wrapped or sealed form.
#[derive(Debug, Error)]
pub enum UnwrapError {
    /// Integrity check failed: the entry was wrapped for someone else, or
    /// its ciphertext was altered.
    #[error("wrapped key does not open under this secret")]
    WrongSecret,

    /// The stored blob does not decode.
    #[error("wrapped key is corrupted: {0}")]
    Corrupted(String),

    /// The unwrapped material is not a 256-bit key.
    #[error("unwrapped key has invalid length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Errors raised by the key vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Resource names must be non-empty.
    #[error("invalid resource name: {0:?}")]
    InvalidResource(String),

    /// Payload or wrap cipher failure.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Stored or shared key could not be unwrapped.
    #[error("unwrap error: {0}")]
    Unwrap(#[from] UnwrapError),

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Encoding a vault blob failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The per-resource lock table was poisoned.
    #[error("resource lock table poisoned")]
    LockPoisoned,
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
