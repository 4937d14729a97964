//! In-memory implementation of the KeyStore trait.
//!
//! Primarily for testing. Same semantics as SQLite but nothing survives
//! the process.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{KeyStore, PutResult};

/// In-memory store implementation. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(name).cloned())
    }

    async fn put(&self, name: &str, blob: &[u8]) -> Result<PutResult> {
        let previous = self.write()?.insert(name.to_string(), blob.to_vec());
        Ok(match previous {
            Some(_) => PutResult::Replaced,
            None => PutResult::Inserted,
        })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn names(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::KeyStoreExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryKeyStore::new();

        assert_eq!(store.get("key_a").await.unwrap(), None);
        assert_eq!(store.put("key_a", b"one").await.unwrap(), PutResult::Inserted);
        assert_eq!(store.get("key_a").await.unwrap(), Some(b"one".to_vec()));
        assert!(store.contains("key_a").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_last_write_wins() {
        let store = MemoryKeyStore::new();

        store.put("key_a", b"one").await.unwrap();
        assert_eq!(store.put("key_a", b"two").await.unwrap(), PutResult::Replaced);
        assert_eq!(store.get("key_a").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete_and_names() {
        let store = MemoryKeyStore::new();
        store.put("key_b", b"").await.unwrap();
        store.put("key_a", b"").await.unwrap();
        store.put("other", b"").await.unwrap();

        assert_eq!(store.names("key_").await.unwrap(), vec!["key_a", "key_b"]);
        assert!(store.delete("key_a").await.unwrap());
        assert!(!store.delete("key_a").await.unwrap());
        assert_eq!(store.names("key_").await.unwrap(), vec!["key_b"]);
    }

    #[tokio::test]
    async fn test_poisoned_lock_is_reported() {
        let store = Arc::new(MemoryKeyStore::new());
        store.put("key_a", b"one").await.unwrap();

        let writer = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = writer.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(StoreError::Poisoned(_))));
        assert!(matches!(store.is_empty(), Err(StoreError::Poisoned(_))));
        assert!(matches!(store.get("key_a").await, Err(StoreError::Poisoned(_))));
    }
}
