//! # Ledgerseal Vault
//!
//! Per-resource key lifecycle and envelope encryption.
//!
//! ## Encryption Model
//!
//! Resource content uses a two-layer key model:
//!
//! 1. **Resource Key**: a random 256-bit key; the payload is encrypted with
//!    AES-256-CBC under it and a fresh IV ([`SymmetricCipher`]).
//! 2. **Wrapped Keys**: the resource key is never stored or shared raw. It
//!    is wrapped under a secret derived from the holder's identity
//!    ([`WrappedKey`]) or sealed to an X25519 public key ([`SealedKey`]).
//!
//! This allows:
//! - Granting access without re-encrypting content
//! - Rotating a resource key without touching previously issued grants
//!
//! ## Wrapping secrets
//!
//! [`WrappingSecret::from_identity`] derives the secret from the public
//! address alone, so anyone who knows the address can unwrap. It exists for
//! compatibility with address-keyed vault entries. Prefer
//! [`WrappingSecret::from_signature`] for entries that only the holder
//! should be able to open.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ledgerseal_core::Identity;
//! use ledgerseal_store::MemoryKeyStore;
//! use ledgerseal_vault::{KeyVault, SymmetricCipher};
//!
//! async fn example(owner: Identity) {
//!     let vault = KeyVault::new(MemoryKeyStore::new());
//!     let key = vault.generate_key();
//!     let payload = SymmetricCipher::encrypt(b"patient data", key.as_bytes()).unwrap();
//!     vault.store("labresult-1", &key, &owner).await.unwrap();
//!
//!     let restored = vault.retrieve("labresult-1", &owner).await.unwrap().unwrap();
//!     assert_eq!(SymmetricCipher::decrypt(&payload, restored.as_bytes()).unwrap(), b"patient data");
//! }
//! ```

pub mod cipher;
pub mod error;
pub mod share;
pub mod vault;
pub mod wrap;

pub use cipher::{EncryptedPayload, InitializationVector, ResourceKey, SymmetricCipher};
pub use error::{CipherError, Result, UnwrapError, VaultError};
pub use share::{SealedKey, X25519PublicKey, X25519StaticSecret};
pub use vault::{validate_resource, KeyVault, ENTRY_PREFIX};
pub use wrap::{vault_secret_message, WrapFormat, WrappedKey, WrappingSecret, VAULT_SECRET_MESSAGE};
