//! # Ledgerseal Core
//!
//! Pure primitives shared by every Ledgerseal crate: identities, Blake3
//! hashes, Ed25519 keys and signatures, and resource fingerprints.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Identity`] - Public-key-derived address (`0x` + 40 hex chars)
//! - [`Blake3Hash`] - 32-byte one-way hash
//! - [`Keypair`] / [`Ed25519PublicKey`] / [`Ed25519Signature`] - signing primitives
//! - [`ResourceFingerprint`] - the only form of a payload that reaches the ledger

pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod identity;

pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, Result};
pub use fingerprint::ResourceFingerprint;
pub use identity::Identity;
