//! SQLite implementation of the KeyStore trait.
//!
//! The durable backend. Uses rusqlite with bundled SQLite, wrapped in
//! async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{KeyStore, PutResult};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let name = name.to_string();

        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT blob FROM vault_entries WHERE entry_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put(&self, name: &str, blob: &[u8]) -> Result<PutResult> {
        let name = name.to_string();
        let blob = blob.to_vec();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let existed = tx
                .query_row(
                    "SELECT 1 FROM vault_entries WHERE entry_name = ?1",
                    params![name],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            tx.execute(
                "INSERT INTO vault_entries (entry_name, blob, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(entry_name) DO UPDATE SET
                    blob = excluded.blob,
                    updated_at = excluded.updated_at",
                params![name, blob, migration::now_millis()],
            )?;

            tx.commit()?;
            tracing::debug!(entry = %name, replaced = existed, "vault entry written");

            Ok(if existed {
                PutResult::Replaced
            } else {
                PutResult::Inserted
            })
        })
        .await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let name = name.to_string();

        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM vault_entries WHERE entry_name = ?1",
                params![name],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn names(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT entry_name FROM vault_entries
                 WHERE substr(entry_name, 1, length(?1)) = ?1
                 ORDER BY entry_name",
            )?;
            let names = stmt
                .query_map(params![prefix], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SqliteKeyStore::open_memory().unwrap();

        assert_eq!(store.get("key_labresult-1").await.unwrap(), None);
        assert_eq!(
            store.put("key_labresult-1", b"blob").await.unwrap(),
            PutResult::Inserted
        );
        assert_eq!(
            store.get("key_labresult-1").await.unwrap(),
            Some(b"blob".to_vec())
        );
    }

    #[tokio::test]
    async fn test_overwrite_reports_replaced() {
        let store = SqliteKeyStore::open_memory().unwrap();

        store.put("key_a", b"first").await.unwrap();
        assert_eq!(store.put("key_a", b"second").await.unwrap(), PutResult::Replaced);
        assert_eq!(store.get("key_a").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_prefix_listing_ignores_like_wildcards() {
        let store = SqliteKeyStore::open_memory().unwrap();
        store.put("key_%a", b"").await.unwrap();
        store.put("key_b", b"").await.unwrap();
        store.put("keyXc", b"").await.unwrap();

        assert_eq!(store.names("key_").await.unwrap(), vec!["key_%a", "key_b"]);
        assert_eq!(store.names("key_%").await.unwrap(), vec!["key_%a"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteKeyStore::open_memory().unwrap();
        store.put("key_a", b"x").await.unwrap();

        assert!(store.delete("key_a").await.unwrap());
        assert!(!store.delete("key_a").await.unwrap());
        assert_eq!(store.get("key_a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        {
            let store = SqliteKeyStore::open(&path).unwrap();
            store.put("key_persisted", b"wrapped").await.unwrap();
        }

        let store = SqliteKeyStore::open(&path).unwrap();
        assert_eq!(
            store.get("key_persisted").await.unwrap(),
            Some(b"wrapped".to_vec())
        );
    }
}
