// src/cache/kv.rs - Key-value store abstraction (TTL + metadata)
//
// Modelled on edge KV namespaces: values are opaque strings, each key may carry
// a small JSON metadata blob and an expiration. Stores record the expiration
// but never hide expired keys from get/list; expiry policy belongs to callers.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::infra::errors::TunerError;

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub expiration_ttl: Option<Duration>,
    pub metadata: Option<Value>,
}

/// One row of a key listing. Carries metadata but not the value.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    pub name: String,
    pub expiration: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, TunerError>;
    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), TunerError>;
    async fn delete(&self, key: &str) -> Result<(), TunerError>;
    /// All keys starting with `prefix`, sorted by name.
    async fn list(&self, prefix: &str) -> Result<Vec<KeyInfo>, TunerError>;
}

pub(crate) fn expiration_from(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = ttl?;
    let delta = chrono::Duration::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(delta)
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    value: String,
    metadata: Option<Value>,
    expiration: Option<DateTime<Utc>>,
}

/// In-process store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    records: Mutex<BTreeMap<String, MemoryRecord>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, MemoryRecord>>, TunerError> {
        self.records
            .lock()
            .map_err(|_| TunerError::Cache("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, TunerError> {
        Ok(self.lock()?.get(key).map(|r| r.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), TunerError> {
        let record = MemoryRecord {
            value: value.to_string(),
            metadata: options.metadata,
            expiration: expiration_from(options.expiration_ttl),
        };
        self.lock()?.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TunerError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KeyInfo>, TunerError> {
        let records = self.lock()?;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, r)| KeyInfo {
                name: k.clone(),
                expiration: r.expiration,
                metadata: r.metadata.clone(),
            })
            .collect())
    }
}
