//! Embedded relational backend, grounded in the original `peewee`-backed
//! `SqliteJobPersistence`/`SqlitePluginPersistence` pair: one table, keyed by the
//! submission's `app_id` (or the plugin's composite key), holding an opaque blob.

use crate::SubmissionStore;
use async_trait::async_trait;
use error::*;
use result::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("failed to open the local sqlite database at '{path}'")]
#[code(Status::InternalServerError)]
pub struct OpenError {
    path: String,
    #[source]
    source: sqlx::Error,
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("sqlite query against table '{table}' failed")]
#[code(Status::InternalServerError)]
pub struct QueryError {
    table: &'static str,
    #[source]
    source: sqlx::Error,
}

pub struct SqliteSubmissionStore {
    pool: SqlitePool,
    table: &'static str,
}

impl SqliteSubmissionStore {
    /// Opens (creating if necessary) the sqlite database at `path` and ensures the
    /// submissions table exists.
    pub async fn submissions<P: AsRef<str>>(path: P) -> Result<Self> {
        Self::open(path, "submissions").await
    }

    /// Opens (creating if necessary) the sqlite database at `path` and ensures the
    /// plugins table exists.
    pub async fn plugins<P: AsRef<str>>(path: P) -> Result<Self> {
        Self::open(path, "plugins").await
    }

    async fn open<P: AsRef<str>>(path: P, table: &'static str) -> Result<Self> {
        let path = path.as_ref();
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };
        let pool = SqlitePoolOptions::new()
            // A single connection keeps an in-memory database (used in tests) coherent
            // across queries; sqlite itself serializes writes regardless of pool size.
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|source| OpenError {
                path: path.to_string(),
                source,
            })?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, blob BLOB NOT NULL)",
            table
        ))
        .execute(&pool)
        .await
        .map_err(|source| QueryError { table, source })?;
        Ok(SqliteSubmissionStore { pool, table })
    }
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (key, blob) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET blob = excluded.blob",
            self.table
        ))
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|source| QueryError {
            table: self.table,
            source,
        })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query(&format!("SELECT blob FROM {} WHERE key = ?", self.table))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| QueryError {
                table: self.table,
                source,
            })?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>("blob")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?", self.table))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|source| QueryError {
                table: self.table,
                source,
            })?;
        Ok(())
    }

    async fn delete_all(&self, prefix: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE key LIKE ?", self.table))
            .bind(format!("{}%", prefix))
            .execute(&self.pool)
            .await
            .map_err(|source| QueryError {
                table: self.table,
                source,
            })?;
        Ok(())
    }

    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>> {
        let rows = sqlx::query(&format!("SELECT key, blob FROM {} WHERE key LIKE ?", self.table))
            .bind(format!("{}%", prefix))
            .fetch_all(&self.pool)
            .await
            .map_err(|source| QueryError {
                table: self.table,
                source,
            })?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("key"),
                    row.get::<Vec<u8>, _>("blob"),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = SqliteSubmissionStore::submissions(":memory:").await.unwrap();
        store.put("kj-abc1234", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("kj-abc1234").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = SqliteSubmissionStore::submissions(":memory:").await.unwrap();
        assert_eq!(store.get("kj-missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_upserts_existing_key() {
        let store = SqliteSubmissionStore::submissions(":memory:").await.unwrap();
        store.put("kj-abc1234", b"first".to_vec()).await.unwrap();
        store.put("kj-abc1234", b"second".to_vec()).await.unwrap();
        assert_eq!(store.get("kj-abc1234").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn delete_all_respects_prefix() {
        let store = SqliteSubmissionStore::submissions(":memory:").await.unwrap();
        store.put("kj-one", b"1".to_vec()).await.unwrap();
        store.put("kj-two", b"2".to_vec()).await.unwrap();
        store.put("other-three", b"3".to_vec()).await.unwrap();
        store.delete_all("kj-").await.unwrap();
        assert_eq!(store.get("kj-one").await.unwrap(), None);
        assert_eq!(store.get("kj-two").await.unwrap(), None);
        assert_eq!(store.get("other-three").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn get_all_returns_matching_keys() {
        let store = SqliteSubmissionStore::submissions(":memory:").await.unwrap();
        store.put("kj-one", b"1".to_vec()).await.unwrap();
        store.put("kj-two", b"2".to_vec()).await.unwrap();
        let all = store.get_all("kj-").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("kj-one"), Some(&b"1".to_vec()));
    }
}
