//! Error types for Ledgerseal Core.

use thiserror::Error;

/// Errors raised by core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid identity {0:?}: expected 0x followed by 40 hex characters")]
    InvalidIdentity(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
