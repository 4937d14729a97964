//! # Ledgerseal
//!
//! Client-side envelope encryption with access control recorded on an
//! external ledger.
//!
//! ## Overview
//!
//! - **Resources** are encrypted under a fresh per-resource key. The
//!   ciphertext stays with the caller; only its fingerprint goes to the
//!   ledger.
//! - **Keys** are kept in a local vault, wrapped under a secret bound to the
//!   holder's identity.
//! - **Sessions** are established by a challenge/response handshake signed
//!   by the user's wallet and verified by the ledger.
//! - **Grants** re-wrap a resource key for another identity and record it on
//!   the ledger.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ledgerseal::session::{Cancellation, Ledger, Wallet};
//! use ledgerseal::store::MemoryKeyStore;
//! use ledgerseal::{AccessCoordinator, CoordinatorConfig, Identity};
//!
//! async fn example<L: Ledger, W: Wallet>(ledger: Arc<L>, wallet: Arc<W>, colleague: Identity) {
//!     let mut coordinator =
//!         AccessCoordinator::new(ledger, wallet, MemoryKeyStore::new(), CoordinatorConfig::default());
//!
//!     coordinator.connect().await.unwrap();
//!     coordinator.authenticate(&mut Cancellation::never()).await.unwrap();
//!
//!     let stored = coordinator
//!         .store_resource("labresult-1", b"patient data")
//!         .await
//!         .unwrap();
//!     coordinator.grant_access("labresult-1", &colleague).await.unwrap();
//!
//!     let plaintext = coordinator
//!         .open_resource("labresult-1", &stored.payload)
//!         .await
//!         .unwrap();
//!     assert_eq!(plaintext, b"patient data");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `ledgerseal::core` - identities, hashes, signatures
//! - `ledgerseal::store` - key store backends
//! - `ledgerseal::vault` - ciphers, wrapped keys, the key vault
//! - `ledgerseal::session` - ledger and wallet interfaces, handshake, sessions

pub mod coordinator;
pub mod error;

// Re-export component crates
pub use ledgerseal_core as core;
pub use ledgerseal_session as session;
pub use ledgerseal_store as store;
pub use ledgerseal_vault as vault;

// Re-export main types for convenience
pub use coordinator::{AccessCoordinator, CoordinatorConfig, GrantOutcome, StoreReceipt, WrappingMode};
pub use error::{CoordinatorError, Result};

// Re-export commonly used types
pub use ledgerseal_core::{Identity, Keypair, ResourceFingerprint};
pub use ledgerseal_session::{Cancellation, Session};
pub use ledgerseal_vault::{EncryptedPayload, ResourceKey};
