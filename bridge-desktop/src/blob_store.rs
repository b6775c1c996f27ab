//! Durable Blob Storage using SQLite
//!
//! One table holds every collection. Each row keeps the record's JSON document
//! in a TEXT column and its attachment in a BLOB column, so binary payloads are
//! stored as-is.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{BlobStore, StoredRecord},
};
use bytes::Bytes;
use sqlx::{
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
    Row,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS blob_records (
        collection TEXT NOT NULL,
        key TEXT NOT NULL,
        document TEXT NOT NULL,
        attachment BLOB,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (collection, key)
    )
"#;

/// Default location of the evidence database inside the user's data directory.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("evidence-queue").join("evidence.db"))
}

/// SQLite-backed [`BlobStore`].
///
/// A handle is bound to one collection; [`SqliteBlobStore::collection_handle`]
/// derives handles for other collections sharing the same pool.
#[derive(Clone)]
pub struct SqliteBlobStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteBlobStore {
    /// Open (or create) the database file at `db_path` and bind to `collection`.
    pub async fn open(db_path: impl AsRef<Path>, collection: impl Into<String>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to open blob store: {}", e)))?;

        let store = Self::with_pool(pool, collection).await?;
        info!(path = ?db_path, collection = %store.collection, "Opened blob store");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    ///
    /// A single connection that never expires, since every SQLite memory
    /// connection is a separate database.
    pub async fn in_memory(collection: impl Into<String>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to open blob store: {}", e)))?;

        Self::with_pool(pool, collection).await
    }

    /// Bind to `collection` on an existing pool, creating the table if needed.
    pub async fn with_pool(pool: SqlitePool, collection: impl Into<String>) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to create table: {}", e)))?;

        Ok(Self {
            pool,
            collection: collection.into(),
        })
    }

    /// Handle on another collection in the same database.
    pub fn collection_handle(&self, collection: impl Into<String>) -> Self {
        Self {
            pool: self.pool.clone(),
            collection: collection.into(),
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            "SELECT document, attachment FROM blob_records WHERE collection = ? AND key = ?",
        )
        .bind(&self.collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::Storage(format!("Failed to read record: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let document: String = row.get("document");
        let attachment: Option<Vec<u8>> = row.get("attachment");

        let document = serde_json::from_str(&document).map_err(|e| {
            BridgeError::OperationFailed(format!("Corrupt document for key {}: {}", key, e))
        })?;

        Ok(Some(StoredRecord {
            document,
            attachment: attachment.map(Bytes::from),
        }))
    }

    async fn write(&self, key: &str, record: &StoredRecord) -> Result<()> {
        let document = serde_json::to_string(&record.document).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to serialize document: {}", e))
        })?;

        // Single-statement upsert: SQLite applies it atomically, so a failure
        // leaves the previous row untouched.
        sqlx::query(
            r#"
            INSERT INTO blob_records (collection, key, document, attachment, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET
                document = excluded.document,
                attachment = excluded.attachment,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.collection)
        .bind(key)
        .bind(document)
        .bind(record.attachment.as_deref())
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Storage(format!("Failed to write record: {}", e)))?;

        debug!(
            collection = %self.collection,
            key = key,
            attachment_bytes = record.attachment.as_ref().map_or(0, |a| a.len()),
            "Stored record"
        );
        Ok(())
    }

    async fn erase(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM blob_records WHERE collection = ? AND key = ?")
            .bind(&self.collection)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to erase record: {}", e)))?;

        debug!(collection = %self.collection, key = key, "Erased record");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM blob_records WHERE collection = ? ORDER BY key")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to list keys: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM blob_records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BridgeError::Storage(format!("Failed to clear collection: {}", e))
            })?;

        debug!(collection = %self.collection, "Cleared collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("blob-store-{}.db", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_read_missing_key_is_none() {
        let store = SqliteBlobStore::in_memory("uploads").await.unwrap();
        assert!(store.read("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = SqliteBlobStore::in_memory("uploads").await.unwrap();
        let payload = Bytes::from(vec![0u8, 1, 2, 255, 254]);
        let record = StoredRecord::new(json!({"note": "roof"})).with_attachment(payload.clone());

        store.write("a", &record).await.unwrap();

        let loaded = store.read("a").await.unwrap().unwrap();
        assert_eq!(loaded.document["note"], "roof");
        assert_eq!(loaded.attachment, Some(payload));
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let store = SqliteBlobStore::in_memory("uploads").await.unwrap();

        store
            .write(
                "a",
                &StoredRecord::new(json!({"v": 1})).with_attachment(Bytes::from_static(b"x")),
            )
            .await
            .unwrap();
        store.write("a", &StoredRecord::new(json!({"v": 2}))).await.unwrap();

        let loaded = store.read("a").await.unwrap().unwrap();
        assert_eq!(loaded.document["v"], 2);
        assert_eq!(loaded.attachment, None);
        assert_eq!(store.keys().await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_erase_is_idempotent() {
        let store = SqliteBlobStore::in_memory("uploads").await.unwrap();
        store.write("a", &StoredRecord::new(json!({}))).await.unwrap();

        store.erase("a").await.unwrap();
        store.erase("a").await.unwrap();
        assert!(store.read("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let uploads = SqliteBlobStore::in_memory("uploads").await.unwrap();
        let other = uploads.collection_handle("other");

        uploads.write("a", &StoredRecord::new(json!({}))).await.unwrap();
        other.write("b", &StoredRecord::new(json!({}))).await.unwrap();

        assert_eq!(uploads.keys().await.unwrap(), vec!["a"]);
        other.clear().await.unwrap();
        assert_eq!(uploads.keys().await.unwrap(), vec!["a"]);
        assert!(other.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let path = temp_db_path();
        let payload = Bytes::from(vec![7u8; 64 * 1024]);

        {
            let store = SqliteBlobStore::open(&path, "uploads").await.unwrap();
            let record = StoredRecord::new(json!({"file_name": "a.jpg"}))
                .with_attachment(payload.clone());
            store.write("a", &record).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteBlobStore::open(&path, "uploads").await.unwrap();
        let loaded = reopened.read("a").await.unwrap().unwrap();
        assert_eq!(loaded.document["file_name"], "a.jpg");
        assert_eq!(loaded.attachment, Some(payload));

        reopened.pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
