//! KeyStore trait: the abstract interface for local key persistence.

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// No entry existed under this name.
    Inserted,
    /// An existing entry was overwritten.
    Replaced,
}

/// Async key-value interface for wrapped key blobs.
///
/// Implementations must make each individual `put` atomic: a concurrent
/// `get` observes either the old blob or the new one, never a mix.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch the blob stored under `name`.
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Store `blob` under `name`, replacing any previous entry.
    async fn put(&self, name: &str, blob: &[u8]) -> Result<PutResult>;

    /// Remove the entry under `name`. Returns whether one existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// List entry names starting with `prefix`, in lexicographic order.
    async fn names(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Extension trait for common store patterns.
pub trait KeyStoreExt: KeyStore {
    /// Check whether an entry exists.
    fn contains(&self, name: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl<S: KeyStore + ?Sized> KeyStoreExt for S {
    async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some())
    }
}
