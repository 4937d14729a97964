//! # Ledgerseal Testkit
//!
//! Testing utilities for Ledgerseal.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Doubles**: [`MemoryLedger`] and [`MemoryWallet`], in-memory stand-ins
//!   for the external ledger and wallet that verify real signatures
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up multi-party scenarios
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use ledgerseal_testkit::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let mut coordinator = fixture.authenticated().await;
//!     coordinator.store_resource("my-resource", b"secret").await.unwrap();
//!     assert_eq!(fixture.ledger.fingerprints_for("my-resource").len(), 1);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ledgerseal_testkit::generators::{plaintext, resource_key};
//!
//! proptest! {
//!     #[test]
//!     fn round_trip(key in resource_key(), data in plaintext(256)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod ledger;
pub mod wallet;

pub use fixtures::{multi_party_fixture, MemoryCoordinator, Party, TestFixture};
pub use ledger::{
    ConfirmHook, FingerprintRecord, GrantRecord, LedgerCalls, MemoryLedger, MemoryLedgerConfig,
};
pub use wallet::{ConnectBehavior, MemoryWallet, SignBehavior};
