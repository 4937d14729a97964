//! Interface to the wallet provider that holds the user's signing key.

use async_trait::async_trait;
use ledgerseal_core::{Ed25519Signature, Identity};
use tokio::sync::broadcast;

use crate::error::WalletError;

/// Result type for wallet calls.
pub type Result<T> = std::result::Result<T, WalletError>;

/// Notifications pushed by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The active account changed. `None` means the wallet disconnected
    /// or exposes no account.
    IdentityChanged(Option<Identity>),

    /// The wallet switched networks.
    NetworkChanged {
        /// Identifier of the new network.
        chain_id: u64,
    },
}

/// A wallet provider.
///
/// `sign` may wait on the user for an unbounded amount of time; callers
/// race it against a cancellation signal.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Request access and return the active identity.
    async fn active_identity(&self) -> Result<Identity>;

    /// Sign `message` with the key behind `identity`.
    async fn sign(&self, identity: &Identity, message: &[u8]) -> Result<Ed25519Signature>;

    /// Subscribe to account and network change notifications.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}
