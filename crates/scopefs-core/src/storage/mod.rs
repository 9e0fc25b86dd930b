//! SQLite-based grant persistence
//!
//! This module provides:
//! - Database initialization and migrations
//! - The async `GrantStore` contract used by the grant manager
//! - A pooled SQLite implementation of it

mod migrations;
mod queries;

pub use migrations::run_migrations;
pub use queries::*;

use crate::error::{Error, Result, StorageError};
use crate::types::Grant;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Database connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;

/// Durable store of grant records.
///
/// Failures surface as `StorageError` and are never retried here.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Open or create the backing store. Later calls are no-ops.
    async fn init(&self) -> Result<()>;

    async fn put(&self, grant: &Grant) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<Grant>>;

    async fn get_all(&self) -> Result<Vec<Grant>>;

    /// Delete a record. Returns true even when the id was already gone.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    async fn remove_setting(&self, key: &str) -> Result<()>;
}

/// Pooled SQLite database
pub struct Storage {
    pool: DbPool,
    db_path: PathBuf,
}

impl Storage {
    /// Open storage at a specific file, creating parent directories
    pub fn from_path(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(StorageError::Database(format!(
                    "Failed to create data directory: {}",
                    e
                )))
            })?;
        }
        info!("Database path: {:?}", db_path);

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self { pool, db_path };
        storage.initialize()?;

        Ok(storage)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };

        storage.initialize()?;

        Ok(storage)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.pool.get()?;
        run_migrations(&conn).map_err(|e| {
            Error::Storage(StorageError::MigrationFailed(e.to_string()))
        })?;
        info!("Database initialized successfully");
        Ok(())
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// `GrantStore` backed by [`Storage`]; the database is opened on first use
pub struct SqliteGrantStore {
    location: Location,
    storage: OnceCell<Storage>,
}

impl SqliteGrantStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(db_path.into()),
            storage: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            storage: OnceCell::new(),
        }
    }

    async fn storage(&self) -> Result<&Storage> {
        self.storage
            .get_or_try_init(|| async {
                let location = self.location.clone();
                tokio::task::spawn_blocking(move || match location {
                    Location::File(path) => Storage::from_path(path),
                    Location::Memory => Storage::in_memory(),
                })
                .await?
            })
            .await
    }

    /// Run `f` against a pooled connection off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.storage().await?.pool().clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl GrantStore for SqliteGrantStore {
    async fn init(&self) -> Result<()> {
        self.storage().await.map(|_| ())
    }

    async fn put(&self, grant: &Grant) -> Result<String> {
        let grant = grant.clone();
        self.with_conn(move |conn| {
            upsert_grant(conn, &grant)?;
            debug!("Stored grant {}", grant.id);
            Ok(grant.id)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Grant>> {
        let id = id.to_string();
        self.with_conn(move |conn| get_grant(conn, &id)).await
    }

    async fn get_all(&self) -> Result<Vec<Grant>> {
        self.with_conn(list_grants).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = delete_grant(conn, &id)?;
            debug!("Deleted grant {} ({} rows)", id, removed);
            Ok(true)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            let removed = clear_grants(conn)?;
            info!("Cleared {} grants", removed);
            Ok(())
        })
        .await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| get_setting(conn, &key)).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| set_setting(conn, &key, &value)).await
    }

    async fn remove_setting(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| delete_setting(conn, &key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapabilityToken;
    use tempfile::tempdir;

    #[test]
    fn test_in_memory_storage() {
        let storage = Storage::in_memory().unwrap();
        assert!(storage.pool().get().is_ok());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = SqliteGrantStore::in_memory();
        store.init().await.unwrap();
        store.put(&Grant::new("a", CapabilityToken::new("/a"))).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_crud() {
        let store = SqliteGrantStore::in_memory();
        let grant = Grant::new("docs", CapabilityToken::new("/home/user/docs"));

        let id = store.put(&grant).await.unwrap();
        assert_eq!(id, grant.id);
        assert_eq!(store.get(&id).await.unwrap().unwrap().display_name, "docs");

        assert!(store.delete(&id).await.unwrap());
        // Deleting again still reports success
        assert!(store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SqliteGrantStore::in_memory();
        store.put(&Grant::new("a", CapabilityToken::new("/a"))).await.unwrap();
        store.put(&Grant::new("b", CapabilityToken::new("/b"))).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grants_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("grants.db");
        let grant = Grant::new("docs", CapabilityToken::new("/home/user/docs"));

        {
            let store = SqliteGrantStore::new(&db_path);
            store.put(&grant).await.unwrap();
            store.set_setting("active_grant", &grant.id).await.unwrap();
        }

        let reopened = SqliteGrantStore::new(&db_path);
        let grants = reopened.get_all().await.unwrap();
        assert_eq!(grants, vec![grant.clone()]);
        assert_eq!(reopened.get_setting("active_grant").await.unwrap(), Some(grant.id));

        reopened.remove_setting("active_grant").await.unwrap();
        assert!(reopened.get_setting("active_grant").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unopenable_path_is_storage_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let store = SqliteGrantStore::new(blocker.join("grants.db"));
        let err = store.init().await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
