// src/cache/prompt_cache.rs - Accepted-result cache over a KV store
//
// Keys are lossy normalizations of the prompt; two prompts that normalize the
// same share an entry (last writer wins). Expiry is lazy: nothing sweeps, a
// read that finds an expired record deletes it, and listings skip keys whose
// metadata says they have expired.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kv::{KeyInfo, KvStore, PutOptions};
use crate::infra::errors::TunerError;
use crate::scoring::{PromptCandidate, RankedPrompt, SimilarityScorer};

pub const KEY_PREFIX: &str = "prompt:";
pub const MAX_KEY_LEN: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
const SIMILAR_LIMIT: usize = 5;

/// Time source, swappable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub prompt: String,
    pub style: String,
    pub score: f64,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// What a caller supplies to `set`; id and timestamps are filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCacheEntry {
    pub prompt: String,
    pub style: String,
    pub score: f64,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    pub image_url: String,
}

/// Lightweight projection stored as key metadata, enough for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub prompt: String,
    pub score: f64,
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Whether a listed key is still live at `now`. The expiry written into the
/// metadata (by the cache's clock) wins over the store's own record.
fn listed_live(key: &KeyInfo, now: DateTime<Utc>) -> bool {
    let from_metadata = key
        .metadata
        .as_ref()
        .and_then(|m| m.get("expires_at"))
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
    from_metadata
        .or(key.expiration)
        .map_or(true, |exp| exp >= now)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total: usize,
    pub by_style: BTreeMap<String, usize>,
    pub avg_score: f64,
}

/// Lower-case, collapse every run of characters outside `[a-z0-9]` into a
/// single `-`, trim separators from both ends, and cap at `MAX_KEY_LEN`.
pub fn normalize_key(prompt: &str) -> String {
    let mut key = String::with_capacity(prompt.len().min(MAX_KEY_LEN));
    let mut in_separator = false;

    for c in prompt.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if in_separator && !key.is_empty() {
                key.push('-');
            }
            in_separator = false;
            key.push(c);
            if key.len() >= MAX_KEY_LEN {
                break;
            }
        } else {
            in_separator = true;
        }
    }

    key.truncate(MAX_KEY_LEN);
    key.trim_end_matches('-').to_string()
}

/// Shared-word ratio: `|common| / max(|words_a|, |words_b|)` over
/// lower-cased whitespace tokens. Zero when either side is empty.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();

    let denom = words_a.len().max(words_b.len());
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    words_a.intersection(&words_b).count() as f64 / denom as f64
}

fn storage_key(prompt_key: &str) -> String {
    format!("{KEY_PREFIX}{}", normalize_key(prompt_key))
}

/// Prompt cache over any `KvStore`. Store failures never escape: reads
/// degrade to a miss, writes report `false`.
#[derive(Clone)]
pub struct PromptCache {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl PromptCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Look up a prompt. Expired records are deleted and reported as a miss.
    pub async fn get(&self, prompt_key: &str) -> Option<CacheEntry> {
        match self.try_get(prompt_key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(error = %e, "Cache get error");
                None
            }
        }
    }

    async fn try_get(&self, prompt_key: &str) -> Result<Option<CacheEntry>, TunerError> {
        let key = storage_key(prompt_key);
        let Some(raw) = self.kv.get(&key).await? else {
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        let entry: CacheEntry = serde_json::from_str(&raw)
            .map_err(|e| TunerError::Cache(format!("malformed record at {key}: {e}")))?;

        if entry.is_expired_at(self.clock.now()) {
            tracing::debug!(key = %key, expires_at = %entry.expires_at, "Cache expired");
            self.kv.delete(&key).await?;
            return Ok(None);
        }

        tracing::info!(key = %key, score = entry.score, "Cache hit");
        Ok(Some(entry))
    }

    /// Store (overwrite) an entry under the prompt's normalized key.
    pub async fn set(&self, prompt_key: &str, data: NewCacheEntry, ttl: Duration) -> bool {
        if ttl.is_zero() {
            tracing::warn!("Refusing to cache with a zero TTL");
            return false;
        }
        match self.try_set(prompt_key, data, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Cache set error");
                false
            }
        }
    }

    async fn try_set(
        &self,
        prompt_key: &str,
        data: NewCacheEntry,
        ttl: Duration,
    ) -> Result<(), TunerError> {
        let id = normalize_key(prompt_key);
        let created_at = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .ok_or_else(|| TunerError::Cache(format!("ttl {ttl:?} out of range")))?;

        let metadata = CacheMetadata {
            prompt: data.prompt.clone(),
            score: data.score,
            style: data.style.clone(),
            expires_at: Some(expires_at),
        };
        let entry = CacheEntry {
            id,
            prompt: data.prompt,
            style: data.style,
            score: data.score,
            features: data.features,
            image_url: data.image_url,
            created_at,
            expires_at,
        };

        let key = format!("{KEY_PREFIX}{}", entry.id);
        self.kv
            .put(
                &key,
                &serde_json::to_string(&entry)?,
                PutOptions {
                    expiration_ttl: Some(ttl),
                    metadata: Some(serde_json::to_value(&metadata)?),
                },
            )
            .await?;

        tracing::info!(key = %key, score = entry.score, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    /// Remove a prompt's entry. Deleting a missing key succeeds.
    pub async fn delete(&self, prompt_key: &str) -> bool {
        let key = storage_key(prompt_key);
        match self.kv.delete(&key).await {
            Ok(()) => {
                tracing::info!(key = %key, "Cache deleted");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Cache delete error");
                false
            }
        }
    }

    /// Unexpired entries of `style` whose word overlap with `prompt` reaches
    /// `threshold`, best stored score first, at most five.
    pub async fn find_similar(&self, prompt: &str, style: &str, threshold: f64) -> Vec<CacheEntry> {
        match self.try_find_similar(prompt, style, threshold).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(error = %e, "Find similar error");
                Vec::new()
            }
        }
    }

    async fn try_find_similar(
        &self,
        prompt: &str,
        style: &str,
        threshold: f64,
    ) -> Result<Vec<CacheEntry>, TunerError> {
        let now = self.clock.now();
        let mut results = Vec::new();

        for key in self.kv.list(KEY_PREFIX).await? {
            // Metadata lets us skip other styles without fetching the record.
            let listed_style = key
                .metadata
                .as_ref()
                .and_then(|m| m.get("style"))
                .and_then(|s| s.as_str());
            if listed_style.is_some_and(|s| s != style) {
                continue;
            }

            let Some(raw) = self.kv.get(&key.name).await? else {
                continue;
            };
            let entry: CacheEntry = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key = %key.name, error = %e, "Skipping malformed cache record");
                    continue;
                }
            };

            if entry.is_expired_at(now) || entry.style != style {
                continue;
            }

            if word_overlap(prompt, &entry.prompt) >= threshold {
                results.push(entry);
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(SIMILAR_LIMIT);

        tracing::info!(count = results.len(), threshold, "Found similar prompts");
        Ok(results)
    }

    /// Vector-ranked neighbours of `prompt` among unexpired entries of
    /// `style`, computed from listing metadata only.
    pub async fn find_nearest(
        &self,
        prompt: &str,
        style: &str,
        top_k: usize,
        scorer: &SimilarityScorer,
    ) -> Vec<RankedPrompt> {
        let now = self.clock.now();
        let keys = match self.kv.list(KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "Find nearest error");
                return Vec::new();
            }
        };

        let candidates: Vec<PromptCandidate> = keys
            .into_iter()
            .filter(|k| listed_live(k, now))
            .filter_map(|k| k.metadata)
            .filter_map(|m| serde_json::from_value::<CacheMetadata>(m).ok())
            .filter(|m| m.style == style)
            .map(|m| PromptCandidate {
                prompt: m.prompt,
                score: m.score,
            })
            .collect();

        scorer.find_similar_prompts(prompt, &candidates, top_k)
    }

    /// Totals over unexpired entries, derived from listing metadata without
    /// fetching records.
    pub async fn stats(&self) -> CacheStats {
        match self.try_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Get stats error");
                CacheStats::default()
            }
        }
    }

    async fn try_stats(&self) -> Result<CacheStats, TunerError> {
        let mut stats = CacheStats::default();
        let mut total_score = 0.0;

        let now = self.clock.now();
        for key in self.kv.list(KEY_PREFIX).await? {
            if !listed_live(&key, now) {
                continue;
            }
            let Some(metadata) = key.metadata else {
                continue;
            };

            stats.total += 1;
            total_score += metadata.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);

            let style = metadata
                .get("style")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown")
                .to_string();
            *stats.by_style.entry(style).or_insert(0) += 1;
        }

        stats.avg_score = if stats.total > 0 {
            total_score / stats.total as f64
        } else {
            0.0
        };

        tracing::info!(total = stats.total, avg_score = stats.avg_score, "Cache stats");
        Ok(stats)
    }
}
