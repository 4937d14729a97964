//! Error types for handshakes, sessions and the external collaborators.

use thiserror::Error;

/// Errors reported by the ledger. Reasons are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The contract rejected the call (revert reason, unauthorized caller).
    #[error("ledger rejected call: {0}")]
    Rejected(String),

    /// The call never reached confirmation.
    #[error("ledger unreachable: {0}")]
    Network(String),
}

/// Errors reported by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// No wallet provider is installed or reachable.
    #[error("no wallet provider available")]
    NoProvider,

    /// The user declined to connect.
    #[error("user rejected the connection request")]
    ConnectionRejected,

    /// The user declined to sign.
    #[error("user rejected the signature request")]
    UserRejected,

    /// The provider failed to produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Challenge/response failures.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The user cancelled or declined the signature request.
    #[error("handshake cancelled by user")]
    UserCancelled,

    /// The wallet could not sign the challenge.
    #[error("signing error: {0}")]
    SigningError(String),

    /// The verifier rejected the proof (bad signature, replayed or stale nonce).
    #[error("verification failed: {0}")]
    VerificationError(String),

    /// The verifier could not be reached.
    #[error("verifier unavailable: {0}")]
    Ledger(LedgerError),

    /// A step was invoked from the wrong state.
    #[error("handshake step {step} not allowed in state {state}")]
    OutOfOrder {
        step: &'static str,
        state: &'static str,
    },
}

/// Session-level failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No wallet provider is available.
    #[error("no wallet provider available")]
    NoProvider,

    /// The user declined to connect.
    #[error("connection rejected by user")]
    ConnectionRejected,

    /// No identity is connected.
    #[error("no identity connected")]
    NotConnected,

    /// The operation requires an authenticated session.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// Authorization changed (identity switch, network switch, session
    /// end) while the operation was in flight.
    #[error("session changed while the operation was in flight")]
    Invalidated,

    /// The handshake failed.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// A ledger call failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A wallet call failed outside connect/sign.
    #[error("wallet error: {0}")]
    Wallet(WalletError),
}

impl From<WalletError> for SessionError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::NoProvider => SessionError::NoProvider,
            WalletError::ConnectionRejected => SessionError::ConnectionRejected,
            other => SessionError::Wallet(other),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
