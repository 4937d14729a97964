//! Ledgerseal session layer.
//!
//! This crate connects a wallet identity to the external ledger:
//!
//! - [`Ledger`] and [`Wallet`]: the external collaborators
//! - [`IdentityHandshake`]: challenge/response proof of key control
//! - [`SessionManager`]: connect, authenticate, end, and react to wallet
//!   notifications
//!
//! Nothing here touches key material beyond the identity's signatures.

pub mod error;
pub mod handshake;
pub mod ledger;
pub mod session;
pub mod wallet;

pub use error::{HandshakeError, LedgerError, Result, SessionError, WalletError};
pub use handshake::{
    cancellation, challenge_digest, unix_now, CancelHandle, Cancellation, Challenge,
    ChallengeNonce, CredentialProof, HandshakeState, IdentityHandshake, CHALLENGE_CONTEXT,
    NONCE_LEN,
};
pub use ledger::{Ledger, TxReceipt};
pub use session::{Session, SessionConfig, SessionManager};
pub use wallet::{Wallet, WalletEvent};
