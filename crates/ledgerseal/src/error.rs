//! Error types for the access coordinator.

use ledgerseal_session::{HandshakeError, LedgerError, SessionError};
use ledgerseal_vault::{CipherError, UnwrapError, VaultError};
use thiserror::Error;

/// Errors that can occur during coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Session error (not connected, not authenticated, changed mid-flight).
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Vault error.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Payload encryption or decryption failed.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Ledger error, surfaced verbatim.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// No local key exists for the resource.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The signature-derived vault secret has not been obtained for the
    /// current identity. Call `authenticate` or `unlock_vault`.
    #[error("vault is locked")]
    VaultLocked,
}

impl From<HandshakeError> for CoordinatorError {
    fn from(e: HandshakeError) -> Self {
        CoordinatorError::Session(SessionError::Handshake(e))
    }
}

impl From<UnwrapError> for CoordinatorError {
    fn from(e: UnwrapError) -> Self {
        CoordinatorError::Vault(VaultError::Unwrap(e))
    }
}

impl CoordinatorError {
    /// Whether the failure is about session state rather than data.
    pub fn is_session_error(&self) -> bool {
        matches!(self, CoordinatorError::Session(_) | CoordinatorError::VaultLocked)
    }
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
