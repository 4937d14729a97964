//! Challenge/response identity handshake.
//!
//! The handshake proves control of an identity's signing key to the
//! ledger:
//!
//! 1. Issue a challenge: a fresh random nonce and the current time, bound to
//!    the identity by a derive-key digest.
//! 2. Ask the wallet to sign the digest. The user may decline or cancel.
//! 3. Submit the proof to the ledger, which checks the signature, consumes
//!    the nonce and rejects stale timestamps.
//!
//! Each attempt uses a new nonce. Cancelling or failing returns the machine
//! to a state from which a new challenge can be issued.

use std::time::{SystemTime, UNIX_EPOCH};

use ledgerseal_core::{Blake3Hash, Ed25519Signature, Identity};
use rand::RngCore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{HandshakeError, LedgerError, WalletError};
use crate::ledger::{Ledger, TxReceipt};
use crate::wallet::Wallet;

/// Derive-key context for challenge digests.
pub const CHALLENGE_CONTEXT: &str = "ledgerseal 2024 handshake challenge v1";

/// Length of a challenge nonce in bytes.
pub const NONCE_LEN: usize = 32;

/// Result type for handshake steps.
pub type Result<T> = std::result::Result<T, HandshakeError>;

/// Single-use random challenge nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChallengeNonce(pub [u8; NONCE_LEN]);

impl ChallengeNonce {
    /// Draw a fresh nonce from the OS-seeded RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ChallengeNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChallengeNonce({})", hex::encode(&self.0[..4]))
    }
}

/// A challenge waiting to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Identity the challenge was issued to.
    pub identity: Identity,
    /// Single-use nonce.
    pub nonce: ChallengeNonce,
    /// Issue time, seconds since the Unix epoch.
    pub issued_at: u64,
    /// The bytes the wallet signs.
    pub digest: Blake3Hash,
}

impl Challenge {
    /// Issue a new challenge for `identity` at the current time.
    pub fn new(identity: Identity) -> Self {
        Self::at(identity, ChallengeNonce::random(), unix_now())
    }

    /// Build a challenge with an explicit nonce and timestamp.
    pub fn at(identity: Identity, nonce: ChallengeNonce, issued_at: u64) -> Self {
        let digest = challenge_digest(&identity, &nonce, issued_at);
        Self {
            identity,
            nonce,
            issued_at,
            digest,
        }
    }
}

/// Compute the digest a wallet signs for a challenge.
///
/// `identity || nonce || issued_at (u64 big-endian)` under
/// [`CHALLENGE_CONTEXT`]. Verifiers recompute it from the proof fields.
pub fn challenge_digest(identity: &Identity, nonce: &ChallengeNonce, issued_at: u64) -> Blake3Hash {
    Blake3Hash::derive(
        CHALLENGE_CONTEXT,
        &[identity.as_bytes(), nonce.as_bytes(), &issued_at.to_be_bytes()],
    )
}

/// A signed challenge, ready for the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialProof {
    /// Identity claiming the proof.
    pub identity: Identity,
    /// Nonce from the challenge.
    pub nonce: ChallengeNonce,
    /// Timestamp from the challenge.
    pub issued_at: u64,
    /// Signature over [`CredentialProof::digest`].
    pub signature: Ed25519Signature,
}

impl CredentialProof {
    /// Recompute the signed digest from the proof fields.
    pub fn digest(&self) -> Blake3Hash {
        challenge_digest(&self.identity, &self.nonce, self.issued_at)
    }
}

/// Where a handshake currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing in flight.
    Idle,
    /// A challenge is waiting for a signature.
    ChallengeIssued(Challenge),
    /// A signed proof is waiting for verification.
    ProofSubmitted(CredentialProof),
    /// The verifier accepted the proof.
    Verified(TxReceipt),
    /// The verifier rejected the proof.
    Rejected,
}

impl HandshakeState {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeState::Idle => "Idle",
            HandshakeState::ChallengeIssued(_) => "ChallengeIssued",
            HandshakeState::ProofSubmitted(_) => "ProofSubmitted",
            HandshakeState::Verified(_) => "Verified",
            HandshakeState::Rejected => "Rejected",
        }
    }
}

/// Create a linked cancellation pair.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), Cancellation(rx))
}

/// Fires a [`Cancellation`].
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Signal cancellation. Later waiters observe it immediately.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observes a cancellation request from the user.
#[derive(Debug, Clone)]
pub struct Cancellation(watch::Receiver<bool>);

impl Cancellation {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    /// Whether cancellation has already been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once cancellation is requested. Pends forever if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Drives one identity through the challenge/response handshake.
#[derive(Debug)]
pub struct IdentityHandshake {
    state: HandshakeState,
}

impl Default for IdentityHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityHandshake {
    /// Create an idle handshake.
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Idle,
        }
    }

    /// Resume from a proof that was signed out of band.
    pub fn from_proof(proof: CredentialProof) -> Self {
        Self {
            state: HandshakeState::ProofSubmitted(proof),
        }
    }

    /// Current state.
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Issue a fresh challenge, abandoning whatever was in flight.
    pub fn issue_challenge(&mut self, identity: &Identity) -> Challenge {
        let challenge = Challenge::new(identity.clone());
        debug!(identity = %identity, nonce = ?challenge.nonce, "challenge issued");
        self.state = HandshakeState::ChallengeIssued(challenge.clone());
        challenge
    }

    /// Ask the wallet to sign the outstanding challenge.
    ///
    /// Cancellation or a declined signature returns the machine to `Idle`.
    pub async fn request_proof<W>(
        &mut self,
        wallet: &W,
        cancel: &mut Cancellation,
    ) -> Result<CredentialProof>
    where
        W: Wallet + ?Sized,
    {
        let challenge = match &self.state {
            HandshakeState::ChallengeIssued(c) => c.clone(),
            other => {
                return Err(HandshakeError::OutOfOrder {
                    step: "request_proof",
                    state: other.name(),
                })
            }
        };

        let signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(identity = %challenge.identity, "signature request cancelled");
                self.state = HandshakeState::Idle;
                return Err(HandshakeError::UserCancelled);
            }
            signed = wallet.sign(&challenge.identity, challenge.digest.as_bytes()) => signed,
        };

        let signature = match signed {
            Ok(sig) => sig,
            Err(WalletError::UserRejected) => {
                self.state = HandshakeState::Idle;
                return Err(HandshakeError::UserCancelled);
            }
            Err(e) => {
                self.state = HandshakeState::Idle;
                return Err(HandshakeError::SigningError(e.to_string()));
            }
        };

        let proof = CredentialProof {
            identity: challenge.identity,
            nonce: challenge.nonce,
            issued_at: challenge.issued_at,
            signature,
        };
        self.state = HandshakeState::ProofSubmitted(proof.clone());
        Ok(proof)
    }

    /// Submit the outstanding proof to the ledger.
    pub async fn verify<L>(&mut self, ledger: &L) -> Result<TxReceipt>
    where
        L: Ledger + ?Sized,
    {
        let proof = match &self.state {
            HandshakeState::ProofSubmitted(p) => p.clone(),
            other => {
                return Err(HandshakeError::OutOfOrder {
                    step: "verify",
                    state: other.name(),
                })
            }
        };

        match ledger.verify_credentials(&proof).await {
            Ok(receipt) => {
                info!(identity = %proof.identity, block = receipt.block, "credentials verified");
                self.state = HandshakeState::Verified(receipt);
                Ok(receipt)
            }
            Err(LedgerError::Rejected(reason)) => {
                warn!(identity = %proof.identity, %reason, "credentials rejected");
                self.state = HandshakeState::Rejected;
                Err(HandshakeError::VerificationError(reason))
            }
            Err(e) => {
                warn!(identity = %proof.identity, error = %e, "verifier unavailable");
                self.state = HandshakeState::Rejected;
                Err(HandshakeError::Ledger(e))
            }
        }
    }

    /// Run a complete handshake for `identity`.
    pub async fn run<W, L>(
        &mut self,
        identity: &Identity,
        wallet: &W,
        ledger: &L,
        cancel: &mut Cancellation,
    ) -> Result<TxReceipt>
    where
        W: Wallet + ?Sized,
        L: Ledger + ?Sized,
    {
        self.issue_challenge(identity);
        self.request_proof(wallet, cancel).await?;
        self.verify(ledger).await
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerseal_core::Keypair;

    fn identity() -> Identity {
        Identity::from_public_key(&Keypair::from_seed(&[3u8; 32]).public_key())
    }

    #[test]
    fn test_digest_binds_every_field() {
        let id = identity();
        let nonce = ChallengeNonce([1u8; NONCE_LEN]);
        let base = challenge_digest(&id, &nonce, 1_000);

        assert_eq!(base, challenge_digest(&id, &nonce, 1_000));
        assert_ne!(base, challenge_digest(&id, &nonce, 1_001));
        assert_ne!(base, challenge_digest(&id, &ChallengeNonce([2u8; NONCE_LEN]), 1_000));

        let other = Identity::from_public_key(&Keypair::from_seed(&[4u8; 32]).public_key());
        assert_ne!(base, challenge_digest(&other, &nonce, 1_000));
    }

    #[test]
    fn test_nonce_debug_shows_prefix_only() {
        let mut bytes = [0u8; NONCE_LEN];
        bytes[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        bytes[4] = 0x11;
        assert_eq!(format!("{:?}", ChallengeNonce(bytes)), "ChallengeNonce(deadbeef)");
    }

    #[test]
    fn test_fresh_nonce_per_challenge() {
        let mut hs = IdentityHandshake::new();
        let first = hs.issue_challenge(&identity()).nonce;
        let second = hs.issue_challenge(&identity()).nonce;
        assert_ne!(first, second);
    }

    #[test]
    fn test_proof_digest_matches_challenge() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        let challenge = Challenge::new(identity());
        let proof = CredentialProof {
            identity: challenge.identity.clone(),
            nonce: challenge.nonce,
            issued_at: challenge.issued_at,
            signature: kp.sign(challenge.digest.as_bytes()),
        };

        assert_eq!(proof.digest(), challenge.digest);
        assert!(kp
            .public_key()
            .verify(proof.digest().as_bytes(), &proof.signature)
            .is_ok());
    }

    #[test]
    fn test_from_proof_starts_submitted() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        let challenge = Challenge::new(identity());
        let proof = CredentialProof {
            identity: challenge.identity,
            nonce: challenge.nonce,
            issued_at: challenge.issued_at,
            signature: kp.sign(challenge.digest.as_bytes()),
        };
        let hs = IdentityHandshake::from_proof(proof);
        assert_eq!(hs.state().name(), "ProofSubmitted");
    }

    #[tokio::test]
    async fn test_cancellation_observed_after_cancel() {
        let (handle, mut cancel) = cancellation();
        assert!(!cancel.is_cancelled());
        handle.cancel();
        assert!(cancel.is_cancelled());
        tokio::time::timeout(std::time::Duration::from_secs(1), cancel.cancelled())
            .await
            .expect("cancellation should resolve");
    }

    #[tokio::test]
    async fn test_never_cancellation_pends() {
        let mut cancel = Cancellation::never();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), cancel.cancelled()).await;
        assert!(waited.is_err());
    }
}
