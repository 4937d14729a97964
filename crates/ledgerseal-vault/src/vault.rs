//! The key vault.
//!
//! Generates resource keys, keeps them locally as [`WrappedKey`] blobs
//! under `"key_<resource>"`, and re-wraps them for other holders.
//!
//! Reads and writes for the same resource are serialized by a per-resource
//! async lock, so a `retrieve` never interleaves with a `store` of the same
//! resource. Distinct resources proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ledgerseal_core::Identity;
use ledgerseal_store::{KeyStore, PutResult};

use crate::cipher::ResourceKey;
use crate::error::{Result, VaultError};
use crate::share::{SealedKey, X25519PublicKey};
use crate::wrap::{WrappedKey, WrappingSecret};

/// Prefix of every vault entry name in the key store.
pub const ENTRY_PREFIX: &str = "key_";

/// Local store of wrapped resource keys.
pub struct KeyVault<S: KeyStore> {
    store: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: KeyStore> KeyVault<S> {
    /// Create a vault over a key store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the underlying store.
    pub fn store_backend(&self) -> &S {
        &self.store
    }

    /// Store entry name for a resource.
    pub fn entry_name(resource: &str) -> String {
        format!("{}{}", ENTRY_PREFIX, resource)
    }

    /// Generate a fresh resource key.
    pub fn generate_key(&self) -> ResourceKey {
        ResourceKey::generate()
    }

    /// Wrap `key` under the identity-derived secret of `identity` and
    /// persist it, replacing any previous key for `resource`.
    pub async fn store(
        &self,
        resource: &str,
        key: &ResourceKey,
        identity: &Identity,
    ) -> Result<PutResult> {
        self.store_with(resource, key, &WrappingSecret::from_identity(identity))
            .await
    }

    /// Wrap `key` under `secret` and persist it.
    pub async fn store_with(
        &self,
        resource: &str,
        key: &ResourceKey,
        secret: &WrappingSecret,
    ) -> Result<PutResult> {
        validate_resource(resource)?;

        let blob = WrappedKey::wrap(key, secret)?.to_bytes()?;

        let lock = self.resource_lock(resource)?;
        let _guard = lock.lock().await;
        let result = self.store.put(&Self::entry_name(resource), &blob).await?;

        tracing::debug!(resource, ?result, "stored wrapped resource key");
        Ok(result)
    }

    /// Load and unwrap the key for `resource` using `identity`'s
    /// identity-derived secret.
    ///
    /// Returns `Ok(None)` when no key exists for the resource.
    pub async fn retrieve(
        &self,
        resource: &str,
        identity: &Identity,
    ) -> Result<Option<ResourceKey>> {
        self.retrieve_with(resource, &WrappingSecret::from_identity(identity))
            .await
    }

    /// Load and unwrap the key for `resource` using `secret`.
    pub async fn retrieve_with(
        &self,
        resource: &str,
        secret: &WrappingSecret,
    ) -> Result<Option<ResourceKey>> {
        validate_resource(resource)?;

        let blob = {
            let lock = self.resource_lock(resource)?;
            let _guard = lock.lock().await;
            self.store.get(&Self::entry_name(resource)).await?
        };

        let Some(blob) = blob else {
            return Ok(None);
        };

        let wrapped = WrappedKey::from_bytes(&blob)?;
        Ok(Some(wrapped.unwrap(secret)?))
    }

    /// Whether a key exists for `resource`.
    pub async fn contains(&self, resource: &str) -> Result<bool> {
        validate_resource(resource)?;

        let lock = self.resource_lock(resource)?;
        let _guard = lock.lock().await;
        Ok(self.store.get(&Self::entry_name(resource)).await?.is_some())
    }

    /// Delete the local key for `resource`. Returns whether one existed.
    pub async fn remove(&self, resource: &str) -> Result<bool> {
        validate_resource(resource)?;

        let lock = self.resource_lock(resource)?;
        let removed = {
            let _guard = lock.lock().await;
            self.store.delete(&Self::entry_name(resource)).await?
        };
        self.release_lock(resource, lock)?;

        if removed {
            tracing::debug!(resource, "removed resource key");
        }
        Ok(removed)
    }

    /// Names of all resources with a local key.
    pub async fn resources(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .names(ENTRY_PREFIX)
            .await?
            .into_iter()
            .filter_map(|name| name.strip_prefix(ENTRY_PREFIX).map(str::to_string))
            .collect())
    }

    /// Wrap `key` for `recipient` instead of the owner.
    ///
    /// The result is what gets handed to the ledger's grant entry point;
    /// the raw key never leaves this process.
    pub fn rewrap_for_recipient(
        &self,
        key: &ResourceKey,
        recipient: &Identity,
    ) -> Result<WrappedKey> {
        Ok(WrappedKey::wrap(key, &WrappingSecret::from_identity(recipient))?)
    }

    /// Recover a key from a [`WrappedKey`] addressed to `holder`.
    pub fn unwrap_for(&self, wrapped: &WrappedKey, holder: &Identity) -> Result<ResourceKey> {
        Ok(wrapped.unwrap(&WrappingSecret::from_identity(holder))?)
    }

    /// Seal `key` to an X25519 recipient.
    pub fn seal_for(
        &self,
        resource: &str,
        key: &ResourceKey,
        recipient: &X25519PublicKey,
    ) -> Result<SealedKey> {
        validate_resource(resource)?;
        Ok(SealedKey::seal(resource, key, recipient)?)
    }

    fn resource_lock(&self, resource: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| VaultError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(resource.to_string()).or_default()))
    }

    /// Drop the map entry for `resource` unless another task still holds it.
    fn release_lock(&self, resource: &str, lock: Arc<tokio::sync::Mutex<()>>) -> Result<()> {
        let mut locks = self.locks.lock().map_err(|_| VaultError::LockPoisoned)?;
        // Clones are only handed out under the map lock, so the count is stable here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(resource);
        }
        Ok(())
    }
}

/// Reject resource names that cannot address a vault entry.
pub fn validate_resource(resource: &str) -> Result<()> {
    if resource.is_empty() {
        return Err(VaultError::InvalidResource(resource.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnwrapError;
    use crate::share::X25519StaticSecret;
    use ledgerseal_core::Keypair;
    use ledgerseal_store::MemoryKeyStore;
    use std::time::Duration;

    fn identity() -> Identity {
        Identity::from_public_key(&Keypair::generate().public_key())
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let owner = identity();
        let key = vault.generate_key();

        assert_eq!(
            vault.store("labresult-1", &key, &owner).await.unwrap(),
            PutResult::Inserted
        );
        let restored = vault.retrieve("labresult-1", &owner).await.unwrap();
        assert_eq!(restored, Some(key));
        assert_eq!(vault.store_backend().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_resource_is_none() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        assert_eq!(vault.retrieve("nothing", &identity()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retrieve_with_wrong_identity_is_unwrap_error() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        vault
            .store("r", &vault.generate_key(), &identity())
            .await
            .unwrap();

        let err = vault.retrieve("r", &identity()).await.unwrap_err();
        assert!(matches!(err, VaultError::Unwrap(UnwrapError::WrongSecret)));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_distinguished() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        vault
            .store_backend()
            .put(&KeyVault::<MemoryKeyStore>::entry_name("r"), &[0xff, 0x00])
            .await
            .unwrap();

        let err = vault.retrieve("r", &identity()).await.unwrap_err();
        assert!(matches!(err, VaultError::Unwrap(UnwrapError::Corrupted(_))));
    }

    #[tokio::test]
    async fn test_rotation_replaces_local_key() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let owner = identity();
        let grantee = identity();

        let old = vault.generate_key();
        vault.store("r", &old, &owner).await.unwrap();
        let shared = vault.rewrap_for_recipient(&old, &grantee).unwrap();

        let new = vault.generate_key();
        assert_eq!(
            vault.store("r", &new, &owner).await.unwrap(),
            PutResult::Replaced
        );

        assert_eq!(vault.retrieve("r", &owner).await.unwrap(), Some(new));
        // The previously shared copy still opens to the old key.
        assert_eq!(vault.unwrap_for(&shared, &grantee).unwrap(), old);
    }

    #[tokio::test]
    async fn test_rewrap_isolated_to_recipient() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let grantee = identity();
        let key = vault.generate_key();

        let wrapped = vault.rewrap_for_recipient(&key, &grantee).unwrap();
        assert_eq!(vault.unwrap_for(&wrapped, &grantee).unwrap(), key);
        assert!(vault.unwrap_for(&wrapped, &identity()).is_err());
    }

    #[tokio::test]
    async fn test_seal_for_recipient() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let recipient = X25519StaticSecret::generate();
        let key = vault.generate_key();

        let sealed = vault.seal_for("r", &key, &recipient.public_key()).unwrap();
        assert_eq!(sealed.open(&recipient).unwrap(), key);
    }

    #[tokio::test]
    async fn test_remove_and_list() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let owner = identity();
        vault.store("a", &vault.generate_key(), &owner).await.unwrap();
        vault.store("b", &vault.generate_key(), &owner).await.unwrap();

        assert_eq!(vault.resources().await.unwrap(), vec!["a", "b"]);
        assert!(vault.remove("a").await.unwrap());
        assert!(!vault.contains("a").await.unwrap());
        assert_eq!(vault.resources().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_remove_releases_resource_lock() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let owner = identity();
        vault.store("a", &vault.generate_key(), &owner).await.unwrap();
        vault.store("b", &vault.generate_key(), &owner).await.unwrap();
        assert_eq!(vault.locks.lock().unwrap().len(), 2);

        assert!(vault.remove("a").await.unwrap());
        assert!(!vault.remove("missing").await.unwrap());

        let locks = vault.locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("b"));
    }

    #[tokio::test]
    async fn test_contains_waits_for_resource_lock() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        vault.store("r", &vault.generate_key(), &identity()).await.unwrap();

        let lock = vault.resource_lock("r").unwrap();
        let guard = lock.lock().await;
        let pending = tokio::time::timeout(Duration::from_millis(20), vault.contains("r")).await;
        assert!(pending.is_err());

        drop(guard);
        assert!(vault.contains("r").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_resource_rejected() {
        let vault = KeyVault::new(MemoryKeyStore::new());
        let err = vault
            .store("", &vault.generate_key(), &identity())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidResource(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_store_and_retrieve_never_tears() {
        let vault = Arc::new(KeyVault::new(MemoryKeyStore::new()));
        let owner = identity();
        vault.store("r", &vault.generate_key(), &owner).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let vault = Arc::clone(&vault);
            let owner = owner.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let key = vault.generate_key();
                    vault.store("r", &key, &owner).await.map(|_| ())
                } else {
                    vault.retrieve("r", &owner).await.map(|key| assert!(key.is_some()))
                }
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }
}
