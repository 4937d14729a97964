//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a shared ledger and parties
//! that each hold a keypair and a wallet.

use std::sync::Arc;

use ledgerseal::{AccessCoordinator, CoordinatorConfig};
use ledgerseal_core::{Identity, Keypair};
use ledgerseal_session::Cancellation;
use ledgerseal_store::MemoryKeyStore;

use crate::ledger::MemoryLedger;
use crate::wallet::MemoryWallet;

/// Coordinator type wired to the in-memory doubles.
pub type MemoryCoordinator = AccessCoordinator<MemoryLedger, MemoryWallet, MemoryKeyStore>;

/// A participant: keypair, identity and wallet.
pub struct Party {
    pub keypair: Keypair,
    pub identity: Identity,
    pub wallet: Arc<MemoryWallet>,
}

impl Party {
    /// Create a party with a deterministic keypair.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        let keypair = Keypair::from_seed(&seed);
        let identity = Identity::from_public_key(&keypair.public_key());
        let wallet = Arc::new(MemoryWallet::new(keypair.clone()));
        Self {
            keypair,
            identity,
            wallet,
        }
    }
}

/// A ledger shared by any number of parties.
pub struct TestFixture {
    pub ledger: Arc<MemoryLedger>,
    pub owner: Party,
}

impl TestFixture {
    /// Create a fixture with a random owner.
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut seed);
        Self::with_seed(seed)
    }

    /// Create with a deterministic owner keypair.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new()), seed)
    }

    /// Create around an existing ledger.
    pub fn with_ledger(ledger: Arc<MemoryLedger>, seed: [u8; 32]) -> Self {
        let owner = Party::with_seed(seed);
        ledger.register(owner.keypair.public_key());
        Self { ledger, owner }
    }

    /// Add another party known to the same ledger.
    pub fn party(&self, seed: [u8; 32]) -> Party {
        let party = Party::with_seed(seed);
        self.ledger.register(party.keypair.public_key());
        party
    }

    /// A coordinator for `party` with a fresh in-memory key store.
    pub fn coordinator_for(&self, party: &Party, config: CoordinatorConfig) -> MemoryCoordinator {
        AccessCoordinator::new(
            Arc::clone(&self.ledger),
            Arc::clone(&party.wallet),
            MemoryKeyStore::new(),
            config,
        )
    }

    /// A coordinator for the owner with default configuration.
    pub fn coordinator(&self) -> MemoryCoordinator {
        self.coordinator_for(&self.owner, CoordinatorConfig::default())
    }

    /// A connected and authenticated coordinator for `party`.
    pub async fn authenticated_for(&self, party: &Party, config: CoordinatorConfig) -> MemoryCoordinator {
        let mut coordinator = self.coordinator_for(party, config);
        coordinator.connect().await.expect("connect");
        coordinator
            .authenticate(&mut Cancellation::never())
            .await
            .expect("authenticate");
        coordinator
    }

    /// A connected and authenticated coordinator for the owner.
    pub async fn authenticated(&self) -> MemoryCoordinator {
        self.authenticated_for(&self.owner, CoordinatorConfig::default())
            .await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a fixture plus `count` extra parties on the same ledger.
pub fn multi_party_fixture(count: usize) -> (TestFixture, Vec<Party>) {
    let fixture = TestFixture::with_seed([0xAA; 32]);
    let parties = (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            fixture.party(seed)
        })
        .collect();
    (fixture, parties)
}
