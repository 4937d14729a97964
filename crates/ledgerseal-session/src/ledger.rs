//! Interface to the external ledger (the access-control contract).
//!
//! The ledger is the source of truth for who holds a session and who was
//! granted which resource. Implementations may talk to a chain node, a
//! relayer, or an in-memory stand-in for tests.

use async_trait::async_trait;
use ledgerseal_core::{Blake3Hash, Identity, ResourceFingerprint};

use crate::error::LedgerError;
use crate::handshake::CredentialProof;

/// Result type for ledger calls.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Confirmation of a state-changing ledger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: Blake3Hash,
    /// Height at which the call was confirmed.
    pub block: u64,
}

/// The external access-control ledger.
///
/// Every state-changing call resolves only once the ledger has confirmed
/// it. Rejections carry the ledger's reason unchanged.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether the ledger already holds an authenticated session for `identity`.
    async fn is_authenticated(&self, identity: &Identity) -> Result<bool>;

    /// Submit a signed challenge for verification.
    ///
    /// On success the ledger records an authenticated session for
    /// `proof.identity` and consumes the nonce.
    async fn verify_credentials(&self, proof: &CredentialProof) -> Result<TxReceipt>;

    /// Record the fingerprint of a stored resource on behalf of `caller`.
    async fn store_fingerprint(
        &self,
        caller: &Identity,
        resource: &str,
        fingerprint: &ResourceFingerprint,
    ) -> Result<TxReceipt>;

    /// Record that `caller` granted `grantee` access to `resource`,
    /// attaching the key material re-wrapped for the grantee.
    async fn grant_access(
        &self,
        caller: &Identity,
        grantee: &Identity,
        resource: &str,
        wrapped_key: &[u8],
    ) -> Result<TxReceipt>;

    /// Tear down the ledger-side session for `caller`.
    async fn end_session(&self, caller: &Identity) -> Result<TxReceipt>;
}
