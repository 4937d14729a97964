//! # Ledgerseal Store
//!
//! Local persistence for wrapped resource keys. The vault never writes raw
//! keys; it hands this crate opaque blobs under `"key_<resource>"` names.
//!
//! ## Key Types
//!
//! - [`KeyStore`] - The async trait for all storage operations
//! - [`SqliteKeyStore`] - SQLite-based durable storage
//! - [`MemoryKeyStore`] - In-memory storage for tests
//! - [`PutResult`] - Whether a write created or replaced an entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ledgerseal_store::{KeyStore, SqliteKeyStore};
//!
//! async fn example() {
//!     let store = SqliteKeyStore::open("vault.db").unwrap();
//!     store.put("key_labresult-1", b"wrapped blob").await.unwrap();
//!     let blob = store.get("key_labresult-1").await.unwrap();
//!     assert!(blob.is_some());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Last write wins**: `put` overwrites; there is no merge.
//! - **No schema on blobs**: the store does not interpret what it holds.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryKeyStore;
pub use sqlite::SqliteKeyStore;
pub use traits::{KeyStore, KeyStoreExt, PutResult};
