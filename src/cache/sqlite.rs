// src/cache/sqlite.rs - SQLite-backed KV store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::kv::{expiration_from, KeyInfo, KvStore, PutOptions};
use super::schema;
use crate::infra::errors::TunerError;

/// Durable `KvStore`. Calls are short and synchronous under a mutex, the same
/// way the rest of the crate shares one connection.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, TunerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory database (for testing).
    pub fn in_memory() -> Result<Self, TunerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, TunerError> {
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TunerError> {
        self.conn
            .lock()
            .map_err(|_| TunerError::Cache("sqlite connection lock poisoned".into()))
    }

    /// Delete every row whose expiration has passed. Returns rows removed.
    pub fn purge_expired(&self) -> Result<usize, TunerError> {
        let now = stamp(Utc::now());
        let removed = self.conn()?.execute(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at < ?1",
            params![now],
        )?;
        Ok(removed)
    }
}

/// Fixed-width UTC timestamps so SQL string comparison orders correctly.
fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_metadata(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, TunerError> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), TunerError> {
        let metadata = options
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let expires_at = expiration_from(options.expiration_ttl).map(stamp);
        let now = stamp(Utc::now());

        self.conn()?.execute(
            "INSERT INTO kv_entries (key, value, metadata, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                metadata = excluded.metadata,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![key, value, metadata, expires_at, now],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TunerError> {
        self.conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KeyInfo>, TunerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, expires_at, metadata FROM kv_entries
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut keys = Vec::new();
        for row in rows {
            let (name, expires_at, metadata) = row?;
            keys.push(KeyInfo {
                name,
                expiration: parse_time(expires_at),
                metadata: parse_metadata(metadata),
            });
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_roundtrip_in_memory() {
        let kv = SqliteKvStore::in_memory().unwrap();
        kv.put(
            "prompt:owl",
            r#"{"a":1}"#,
            PutOptions {
                expiration_ttl: Some(Duration::from_secs(30)),
                metadata: Some(json!({"score": 0.7})),
            },
        )
        .await
        .unwrap();

        assert_eq!(kv.get("prompt:owl").await.unwrap().as_deref(), Some(r#"{"a":1}"#));

        let keys = kv.list("prompt:").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].metadata, Some(json!({"score": 0.7})));
        assert!(keys[0].expiration.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_upsert_replaces_value_and_metadata() {
        let kv = SqliteKvStore::in_memory().unwrap();
        let meta = |s: f64| PutOptions {
            expiration_ttl: None,
            metadata: Some(json!({ "score": s })),
        };
        kv.put("k", "v1", meta(0.1)).await.unwrap();
        kv.put("k", "v2", meta(0.2)).await.unwrap();

        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v2"));
        let keys = kv.list("").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].metadata, Some(json!({"score": 0.2})));
        assert!(keys[0].expiration.is_none());
    }

    #[tokio::test]
    async fn test_prefix_is_literal() {
        let kv = SqliteKvStore::in_memory().unwrap();
        kv.put("prompt:a", "1", PutOptions::default()).await.unwrap();
        kv.put("prompt_b", "2", PutOptions::default()).await.unwrap();
        // '_' must not act as a LIKE wildcard
        let keys = kv.list("prompt:").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "prompt:a");
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let kv = SqliteKvStore::in_memory().unwrap();
        kv.put("live", "1", PutOptions::default()).await.unwrap();
        kv.put("dead", "2", PutOptions::default()).await.unwrap();
        {
            let conn = kv.conn().unwrap();
            conn.execute(
                "UPDATE kv_entries SET expires_at = '2000-01-01T00:00:00+00:00' WHERE key = 'dead'",
                [],
            )
            .unwrap();
        }

        assert_eq!(kv.purge_expired().unwrap(), 1);
        assert!(kv.get("dead").await.unwrap().is_none());
        assert!(kv.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        {
            let kv = SqliteKvStore::open(&path).unwrap();
            kv.put("k", "persisted", PutOptions::default()).await.unwrap();
        }
        let kv = SqliteKvStore::open(&path).unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("persisted"));
    }
}
