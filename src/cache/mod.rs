// src/cache/mod.rs - Prompt cache and its key-value backends

pub mod kv;
pub mod prompt_cache;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

pub use kv::{KeyInfo, KvStore, MemoryKvStore, PutOptions};
pub use prompt_cache::{
    normalize_key, word_overlap, CacheEntry, CacheStats, Clock, NewCacheEntry, PromptCache,
    SystemClock,
};
pub use sqlite::SqliteKvStore;

use crate::infra::config::CacheConfig;
use crate::infra::errors::TunerError;

/// Open the configured durable cache.
pub fn open(config: &CacheConfig) -> Result<PromptCache, TunerError> {
    let path = config.resolved_db_path();
    tracing::debug!(path = %path.display(), "Opening prompt cache");
    let store = SqliteKvStore::open(&path)?;
    Ok(PromptCache::new(Arc::new(store)))
}

impl CacheConfig {
    /// Configured TTL, or the default when the setting is zero.
    pub fn ttl(&self) -> Duration {
        if self.ttl_seconds == 0 {
            prompt_cache::DEFAULT_TTL
        } else {
            Duration::from_secs(self.ttl_seconds)
        }
    }
}
