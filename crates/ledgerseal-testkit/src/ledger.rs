//! In-memory ledger double.
//!
//! Behaves like the access-control contract: it verifies handshake proofs
//! against registered public keys, consumes nonces, enforces a freshness
//! window, and only accepts writes from identities holding a session.
//! Every call is counted so tests can assert that a path made no ledger
//! call at all.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ledgerseal_core::{Blake3Hash, Ed25519PublicKey, Identity, ResourceFingerprint};
use ledgerseal_session::{unix_now, ChallengeNonce, CredentialProof, Ledger, LedgerError, TxReceipt};
use tracing::debug;

type Result<T> = std::result::Result<T, LedgerError>;

/// Hook run just before a state-changing call is confirmed.
pub type ConfirmHook = Arc<dyn Fn() + Send + Sync>;

/// Configuration for [`MemoryLedger`].
#[derive(Debug, Clone)]
pub struct MemoryLedgerConfig {
    /// Maximum age of a challenge, in seconds, when its proof is verified.
    pub max_challenge_age_secs: u64,
    /// Tolerated clock skew for challenges dated in the future.
    pub max_clock_skew_secs: u64,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self {
            max_challenge_age_secs: 300,
            max_clock_skew_secs: 30,
        }
    }
}

/// A fingerprint recorded by `store_fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub owner: Identity,
    pub resource: String,
    pub fingerprint: ResourceFingerprint,
    pub block: u64,
}

/// A grant recorded by `grant_access`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRecord {
    pub grantor: Identity,
    pub grantee: Identity,
    pub resource: String,
    pub wrapped_key: Vec<u8>,
    pub block: u64,
}

/// Number of calls per entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCalls {
    pub is_authenticated: usize,
    pub verify_credentials: usize,
    pub store_fingerprint: usize,
    pub grant_access: usize,
    pub end_session: usize,
}

impl LedgerCalls {
    /// Calls to any state-changing entry point.
    pub fn writes(&self) -> usize {
        self.verify_credentials + self.store_fingerprint + self.grant_access + self.end_session
    }

    /// Calls to any entry point.
    pub fn total(&self) -> usize {
        self.writes() + self.is_authenticated
    }
}

#[derive(Default)]
struct LedgerState {
    registry: HashMap<Identity, Ed25519PublicKey>,
    sessions: HashSet<Identity>,
    used_nonces: HashSet<ChallengeNonce>,
    fingerprints: Vec<FingerprintRecord>,
    grants: Vec<GrantRecord>,
    block: u64,
    calls: LedgerCalls,
    fail_next: Option<LedgerError>,
    reject_grants: Option<String>,
}

impl LedgerState {
    fn confirm(&mut self, kind: &str, caller: &Identity) -> TxReceipt {
        self.block += 1;
        TxReceipt {
            tx_hash: Blake3Hash::derive(
                "ledgerseal testkit transaction",
                &[kind.as_bytes(), caller.as_bytes(), &self.block.to_be_bytes()],
            ),
            block: self.block,
        }
    }

    fn require_session(&self, caller: &Identity) -> Result<()> {
        if self.sessions.contains(caller) {
            Ok(())
        } else {
            Err(LedgerError::Rejected("caller not authenticated".into()))
        }
    }
}

/// In-memory stand-in for the access-control ledger.
pub struct MemoryLedger {
    config: MemoryLedgerConfig,
    state: Mutex<LedgerState>,
    on_confirm: Mutex<Option<ConfirmHook>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Create a ledger with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryLedgerConfig::default())
    }

    /// Create a ledger with a custom configuration.
    pub fn with_config(config: MemoryLedgerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState::default()),
            on_confirm: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_confirm_hook(&self) {
        let hook = self
            .on_confirm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Register the public key behind an identity. Returns the identity.
    pub fn register(&self, public_key: Ed25519PublicKey) -> Identity {
        let identity = Identity::from_public_key(&public_key);
        self.state().registry.insert(identity.clone(), public_key);
        identity
    }

    /// Open a session directly, as if it had been established earlier.
    pub fn open_session(&self, identity: &Identity) {
        self.state().sessions.insert(identity.clone());
    }

    /// Whether `identity` currently holds a session.
    pub fn has_session(&self, identity: &Identity) -> bool {
        self.state().sessions.contains(identity)
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: LedgerError) {
        self.state().fail_next = Some(error);
    }

    /// Reject every grant with `reason`, or stop rejecting with `None`.
    pub fn reject_grants(&self, reason: Option<&str>) {
        self.state().reject_grants = reason.map(str::to_owned);
    }

    /// Run `hook` before each state-changing call is confirmed.
    pub fn on_confirm(&self, hook: Option<ConfirmHook>) {
        *self.on_confirm.lock().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    /// Fingerprints recorded so far.
    pub fn fingerprints(&self) -> Vec<FingerprintRecord> {
        self.state().fingerprints.clone()
    }

    /// Fingerprints recorded for `resource`.
    pub fn fingerprints_for(&self, resource: &str) -> Vec<FingerprintRecord> {
        self.state()
            .fingerprints
            .iter()
            .filter(|r| r.resource == resource)
            .cloned()
            .collect()
    }

    /// Grants recorded so far.
    pub fn grants(&self) -> Vec<GrantRecord> {
        self.state().grants.clone()
    }

    /// Call counters.
    pub fn calls(&self) -> LedgerCalls {
        self.state().calls
    }

    fn verify_proof(&self, state: &mut LedgerState, proof: &CredentialProof) -> Result<()> {
        let public_key = state
            .registry
            .get(&proof.identity)
            .copied()
            .ok_or_else(|| LedgerError::Rejected("unknown identity".into()))?;

        if state.used_nonces.contains(&proof.nonce) {
            return Err(LedgerError::Rejected("nonce already used".into()));
        }

        let now = unix_now();
        if proof.issued_at.saturating_add(self.config.max_challenge_age_secs) < now {
            return Err(LedgerError::Rejected("challenge expired".into()));
        }
        if proof.issued_at > now.saturating_add(self.config.max_clock_skew_secs) {
            return Err(LedgerError::Rejected("challenge issued in the future".into()));
        }

        public_key
            .verify(proof.digest().as_bytes(), &proof.signature)
            .map_err(|_| LedgerError::Rejected("invalid signature".into()))?;

        state.used_nonces.insert(proof.nonce);
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn is_authenticated(&self, identity: &Identity) -> Result<bool> {
        let mut state = self.state();
        state.calls.is_authenticated += 1;
        if let Some(e) = state.fail_next.take() {
            return Err(e);
        }
        Ok(state.sessions.contains(identity))
    }

    async fn verify_credentials(&self, proof: &CredentialProof) -> Result<TxReceipt> {
        {
            let mut state = self.state();
            state.calls.verify_credentials += 1;
            if let Some(e) = state.fail_next.take() {
                return Err(e);
            }
            self.verify_proof(&mut state, proof)?;
        }
        self.run_confirm_hook();

        let mut state = self.state();
        state.sessions.insert(proof.identity.clone());
        let receipt = state.confirm("verify", &proof.identity);
        debug!(identity = %proof.identity, block = receipt.block, "credentials accepted");
        Ok(receipt)
    }

    async fn store_fingerprint(
        &self,
        caller: &Identity,
        resource: &str,
        fingerprint: &ResourceFingerprint,
    ) -> Result<TxReceipt> {
        {
            let mut state = self.state();
            state.calls.store_fingerprint += 1;
            if let Some(e) = state.fail_next.take() {
                return Err(e);
            }
            state.require_session(caller)?;
        }
        self.run_confirm_hook();

        let mut state = self.state();
        let receipt = state.confirm("fingerprint", caller);
        state.fingerprints.push(FingerprintRecord {
            owner: caller.clone(),
            resource: resource.to_owned(),
            fingerprint: *fingerprint,
            block: receipt.block,
        });
        Ok(receipt)
    }

    async fn grant_access(
        &self,
        caller: &Identity,
        grantee: &Identity,
        resource: &str,
        wrapped_key: &[u8],
    ) -> Result<TxReceipt> {
        {
            let mut state = self.state();
            state.calls.grant_access += 1;
            if let Some(e) = state.fail_next.take() {
                return Err(e);
            }
            state.require_session(caller)?;
            if let Some(reason) = &state.reject_grants {
                return Err(LedgerError::Rejected(reason.clone()));
            }
        }
        self.run_confirm_hook();

        let mut state = self.state();
        let receipt = state.confirm("grant", caller);
        state.grants.push(GrantRecord {
            grantor: caller.clone(),
            grantee: grantee.clone(),
            resource: resource.to_owned(),
            wrapped_key: wrapped_key.to_vec(),
            block: receipt.block,
        });
        Ok(receipt)
    }

    async fn end_session(&self, caller: &Identity) -> Result<TxReceipt> {
        let mut state = self.state();
        state.calls.end_session += 1;
        if let Some(e) = state.fail_next.take() {
            return Err(e);
        }
        if !state.sessions.remove(caller) {
            return Err(LedgerError::Rejected("no active session".into()));
        }
        Ok(state.confirm("end", caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerseal_core::Keypair;
    use ledgerseal_session::Challenge;

    fn proof_at(kp: &Keypair, issued_at: u64) -> CredentialProof {
        let identity = Identity::from_public_key(&kp.public_key());
        let challenge = Challenge::at(identity.clone(), ChallengeNonce::random(), issued_at);
        CredentialProof {
            identity,
            nonce: challenge.nonce,
            issued_at,
            signature: kp.sign(challenge.digest.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_valid_proof_opens_session() {
        let ledger = MemoryLedger::new();
        let kp = Keypair::generate();
        let identity = ledger.register(kp.public_key());

        let receipt = ledger.verify_credentials(&proof_at(&kp, unix_now())).await.unwrap();

        assert_eq!(receipt.block, 1);
        assert!(ledger.has_session(&identity));
        assert!(ledger.is_authenticated(&identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_replayed_nonce_rejected() {
        let ledger = MemoryLedger::new();
        let kp = Keypair::generate();
        ledger.register(kp.public_key());
        let proof = proof_at(&kp, unix_now());

        ledger.verify_credentials(&proof).await.unwrap();
        let err = ledger.verify_credentials(&proof).await.unwrap_err();

        assert_eq!(err, LedgerError::Rejected("nonce already used".into()));
    }

    #[tokio::test]
    async fn test_stale_challenge_rejected() {
        let ledger = MemoryLedger::with_config(MemoryLedgerConfig {
            max_challenge_age_secs: 60,
            ..Default::default()
        });
        let kp = Keypair::generate();
        ledger.register(kp.public_key());

        let err = ledger
            .verify_credentials(&proof_at(&kp, unix_now() - 120))
            .await
            .unwrap_err();

        assert_eq!(err, LedgerError::Rejected("challenge expired".into()));
    }

    #[tokio::test]
    async fn test_signature_from_other_key_rejected() {
        let ledger = MemoryLedger::new();
        let owner = Keypair::generate();
        let forger = Keypair::generate();
        ledger.register(owner.public_key());

        let mut proof = proof_at(&owner, unix_now());
        proof.signature = forger.sign(proof.digest().as_bytes());

        let err = ledger.verify_credentials(&proof).await.unwrap_err();
        assert_eq!(err, LedgerError::Rejected("invalid signature".into()));
        assert!(!ledger.has_session(&proof.identity));
    }

    #[tokio::test]
    async fn test_writes_require_session() {
        let ledger = MemoryLedger::new();
        let kp = Keypair::generate();
        let identity = ledger.register(kp.public_key());
        let fp = ResourceFingerprint::compute(b"ct", b"iv");

        assert!(ledger.store_fingerprint(&identity, "r", &fp).await.is_err());

        ledger.open_session(&identity);
        ledger.store_fingerprint(&identity, "r", &fp).await.unwrap();

        assert_eq!(ledger.fingerprints_for("r").len(), 1);
        assert_eq!(ledger.calls().store_fingerprint, 2);
    }

    #[tokio::test]
    async fn test_end_session_without_session_rejected() {
        let ledger = MemoryLedger::new();
        let identity = ledger.register(Keypair::generate().public_key());
        assert!(matches!(
            ledger.end_session(&identity).await,
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_next_applies_once() {
        let ledger = MemoryLedger::new();
        let identity = ledger.register(Keypair::generate().public_key());
        ledger.fail_next(LedgerError::Network("down".into()));

        assert_eq!(
            ledger.is_authenticated(&identity).await,
            Err(LedgerError::Network("down".into()))
        );
        assert_eq!(ledger.is_authenticated(&identity).await, Ok(false));
    }
}
