//! Proptest generators for property-based testing.

use proptest::prelude::*;

use ledgerseal_core::{Identity, Keypair};
use ledgerseal_vault::{ResourceKey, X25519StaticSecret};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate an identity backed by a random keypair.
pub fn identity() -> impl Strategy<Value = Identity> {
    keypair().prop_map(|kp| Identity::from_public_key(&kp.public_key()))
}

/// Generate two distinct identities.
pub fn identity_pair() -> impl Strategy<Value = (Identity, Identity)> {
    (identity(), identity()).prop_filter("identities must differ", |(a, b)| a != b)
}

/// Generate a resource key.
pub fn resource_key() -> impl Strategy<Value = ResourceKey> {
    any::<[u8; 32]>().prop_map(ResourceKey::from_bytes)
}

/// Generate an X25519 secret.
pub fn x25519_secret() -> impl Strategy<Value = X25519StaticSecret> {
    any::<[u8; 32]>().prop_map(X25519StaticSecret::from_bytes)
}

/// Generate a resource name.
pub fn resource_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}".prop_map(String::from)
}

/// Generate plaintext bytes of at most `max_len` bytes.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}
