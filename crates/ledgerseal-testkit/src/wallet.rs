//! In-memory wallet double.
//!
//! Holds real Ed25519 keypairs so signatures verify against the ledger
//! double. Connection and signing behavior can be scripted to simulate a
//! missing provider, a user who declines, or a signature prompt that never
//! returns.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ledgerseal_core::{Ed25519PublicKey, Ed25519Signature, Identity, Keypair};
use ledgerseal_session::{Wallet, WalletError, WalletEvent};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// How the wallet answers `active_identity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Approve,
    Reject,
    NoProvider,
}

/// How the wallet answers `sign`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignBehavior {
    Approve,
    Reject,
    Fail(String),
    /// Never answer; the caller must cancel.
    Hang,
}

struct WalletState {
    accounts: HashMap<Identity, Keypair>,
    active: Option<Identity>,
    connect: ConnectBehavior,
    sign: SignBehavior,
    signatures: usize,
}

/// In-memory wallet provider.
pub struct MemoryWallet {
    state: Mutex<WalletState>,
    events: broadcast::Sender<WalletEvent>,
}

impl MemoryWallet {
    /// A wallet whose active account is `keypair`.
    pub fn new(keypair: Keypair) -> Self {
        let identity = Identity::from_public_key(&keypair.public_key());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut accounts = HashMap::new();
        accounts.insert(identity.clone(), keypair);
        Self {
            state: Mutex::new(WalletState {
                accounts,
                active: Some(identity),
                connect: ConnectBehavior::Approve,
                sign: SignBehavior::Approve,
                signatures: 0,
            }),
            events,
        }
    }

    /// A wallet with a freshly generated account.
    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active identity, bypassing connect behavior.
    pub fn identity(&self) -> Option<Identity> {
        self.state().active.clone()
    }

    /// Public key of the active account.
    pub fn public_key(&self) -> Option<Ed25519PublicKey> {
        let state = self.state();
        state
            .active
            .as_ref()
            .and_then(|id| state.accounts.get(id))
            .map(Keypair::public_key)
    }

    /// Add `keypair` as an account and make it active, notifying subscribers.
    pub fn switch_to(&self, keypair: Keypair) -> Identity {
        let identity = Identity::from_public_key(&keypair.public_key());
        {
            let mut state = self.state();
            state.accounts.insert(identity.clone(), keypair);
            state.active = Some(identity.clone());
        }
        self.emit(WalletEvent::IdentityChanged(Some(identity.clone())));
        identity
    }

    /// Lock the wallet: no active account.
    pub fn disconnect(&self) {
        self.state().active = None;
        self.emit(WalletEvent::IdentityChanged(None));
    }

    /// Switch networks.
    pub fn change_network(&self, chain_id: u64) {
        self.emit(WalletEvent::NetworkChanged { chain_id });
    }

    /// Script how connection requests are answered.
    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.state().connect = behavior;
    }

    /// Script how signature requests are answered.
    pub fn set_sign_behavior(&self, behavior: SignBehavior) {
        self.state().sign = behavior;
    }

    /// Number of signatures produced.
    pub fn signature_count(&self) -> usize {
        self.state().signatures
    }

    fn emit(&self, event: WalletEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    async fn active_identity(&self) -> Result<Identity, WalletError> {
        let state = self.state();
        match state.connect {
            ConnectBehavior::NoProvider => Err(WalletError::NoProvider),
            ConnectBehavior::Reject => Err(WalletError::ConnectionRejected),
            ConnectBehavior::Approve => state.active.clone().ok_or(WalletError::ConnectionRejected),
        }
    }

    async fn sign(&self, identity: &Identity, message: &[u8]) -> Result<Ed25519Signature, WalletError> {
        let behavior = self.state().sign.clone();
        match behavior {
            SignBehavior::Approve => {}
            SignBehavior::Reject => return Err(WalletError::UserRejected),
            SignBehavior::Fail(reason) => return Err(WalletError::Signing(reason)),
            SignBehavior::Hang => std::future::pending::<()>().await,
        }

        let mut state = self.state();
        let signature = state
            .accounts
            .get(identity)
            .map(|kp| kp.sign(message))
            .ok_or_else(|| WalletError::Signing(format!("no account for {identity}")))?;
        state.signatures += 1;
        Ok(signature)
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
