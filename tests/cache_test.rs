// tests/cache_test.rs - Integration test: prompt cache over durable and failing stores

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use pretty_assertions::assert_eq;

use moonforge::cache::{
    Clock, KeyInfo, KvStore, NewCacheEntry, PromptCache, PutOptions, SqliteKvStore,
};
use moonforge::infra::errors::TunerError;
use moonforge::scoring::SimilarityScorer;

mock! {
    pub Store {}

    #[async_trait]
    impl KvStore for Store {
        async fn get(&self, key: &str) -> Result<Option<String>, TunerError>;
        async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), TunerError>;
        async fn delete(&self, key: &str) -> Result<(), TunerError>;
        async fn list(&self, prefix: &str) -> Result<Vec<KeyInfo>, TunerError>;
    }
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn at(t: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(t)))
    }

    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn entry(prompt: &str, style: &str, score: f64) -> NewCacheEntry {
    NewCacheEntry {
        prompt: prompt.into(),
        style: style.into(),
        score,
        features: [("style_alignment".to_string(), 0.5)].into_iter().collect(),
        image_url: format!("https://img.test/{}.png", prompt.len()),
    }
}

fn down() -> TunerError {
    TunerError::Cache("store unavailable".into())
}

#[tokio::test]
async fn test_failing_store_degrades_quietly() {
    let mut store = MockStore::new();
    store.expect_get().returning(|_| Err(down()));
    store.expect_put().returning(|_, _, _| Err(down()));
    store.expect_delete().returning(|_| Err(down()));
    store.expect_list().returning(|_| Err(down()));

    let cache = PromptCache::new(Arc::new(store));

    assert!(cache.get("owl").await.is_none());
    assert!(!cache.set("owl", entry("owl", "wizard", 0.9), Duration::from_secs(60)).await);
    assert!(!cache.delete("owl").await);
    assert!(cache.find_similar("owl", "wizard", 0.5).await.is_empty());
    assert!(cache
        .find_nearest("owl", "wizard", 3, &SimilarityScorer::default())
        .await
        .is_empty());

    let stats = cache.stats().await;
    assert_eq!(stats.total, 0);
    assert_eq!(stats.avg_score, 0.0);
}

#[tokio::test]
async fn test_writes_use_normalized_key_and_metadata() {
    let mut store = MockStore::new();
    store
        .expect_put()
        .withf(|key, value, options| {
            key.to_string() == "prompt:blue-dragon-at-dawn"
                && value.contains("\"style\":\"cyber\"")
                && options.expiration_ttl == Some(Duration::from_secs(120))
                && options
                    .metadata
                    .as_ref()
                    .is_some_and(|m| m["style"] == "cyber" && m["score"] == 0.8)
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let cache = PromptCache::new(Arc::new(store));
    assert!(
        cache
            .set(
                "  Blue Dragon, at DAWN!",
                entry("blue dragon at dawn", "cyber", 0.8),
                Duration::from_secs(120),
            )
            .await
    );
}

#[tokio::test]
async fn test_sqlite_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("prompts.db");

    {
        let cache = PromptCache::new(Arc::new(SqliteKvStore::open(&path).unwrap()));
        assert!(
            cache
                .set("owl with hat", entry("owl with hat, glow", "wizard", 0.9), Duration::from_secs(600))
                .await
        );
        assert!(
            cache
                .set("owl in space", entry("owl in space, stars", "cosmic", 0.7), Duration::from_secs(600))
                .await
        );
    }

    let cache = PromptCache::new(Arc::new(SqliteKvStore::open(&path).unwrap()));
    let hit = cache.get("Owl with HAT").await.unwrap();
    assert_eq!(hit.id, "owl-with-hat");
    assert_eq!(hit.prompt, "owl with hat, glow");
    assert_eq!(hit.features.get("style_alignment"), Some(&0.5));

    let stats = cache.stats().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_style.get("wizard"), Some(&1));
    assert_eq!(stats.by_style.get("cosmic"), Some(&1));
    assert!((stats.avg_score - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_sqlite_expiry_with_clock() {
    let store = Arc::new(SqliteKvStore::in_memory().unwrap());
    let clock = ManualClock::at(Utc::now());
    let cache = PromptCache::new(store.clone()).with_clock(clock.clone());

    cache
        .set("red fox", entry("red fox neon", "cyber", 0.9), Duration::from_secs(60))
        .await;
    cache
        .set("red fox hat", entry("red fox hat neon", "cyber", 0.95), Duration::from_secs(3600))
        .await;

    let similar = cache.find_similar("red fox", "cyber", 0.5).await;
    assert_eq!(similar.len(), 2);
    assert_eq!(similar[0].score, 0.95);

    clock.advance(Duration::from_secs(120));

    let similar = cache.find_similar("red fox", "cyber", 0.5).await;
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].id, "red-fox-hat");

    // Expired reads remove the record
    assert!(cache.get("red fox").await.is_none());
    assert!(store.get("prompt:red-fox").await.unwrap().is_none());
    assert!(cache.get("red fox hat").await.is_some());
}

#[tokio::test]
async fn test_purge_removes_only_expired_rows() {
    let store = Arc::new(SqliteKvStore::in_memory().unwrap());
    let cache = PromptCache::new(store.clone());

    cache
        .set("short lived", entry("short lived", "wizard", 0.9), Duration::from_millis(1))
        .await;
    cache
        .set("long lived", entry("long lived", "wizard", 0.9), Duration::from_secs(600))
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(store.purge_expired().unwrap(), 1);
    assert_eq!(cache.stats().await.total, 1);
    assert!(cache.get("long lived").await.is_some());
}

#[tokio::test]
async fn test_find_nearest_ranks_same_style_metadata() {
    let cache = PromptCache::new(Arc::new(SqliteKvStore::in_memory().unwrap()));
    cache
        .set("owl", entry("owl with hat", "wizard", 0.8), Duration::from_secs(60))
        .await;
    cache
        .set("cat", entry("cat on a broom", "wizard", 0.6), Duration::from_secs(60))
        .await;
    cache
        .set("owl cyber", entry("owl with hat", "cyber", 0.9), Duration::from_secs(60))
        .await;

    let ranked = cache
        .find_nearest("owl with hat", "wizard", 5, &SimilarityScorer::default())
        .await;
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].prompt, "owl with hat");
}

#[tokio::test]
async fn test_sqlite_stats_skip_unread_expired_rows() {
    let store = Arc::new(SqliteKvStore::in_memory().unwrap());
    let clock = ManualClock::at(Utc::now());
    let cache = PromptCache::new(store.clone()).with_clock(clock.clone());

    cache
        .set("owl", entry("owl with hat", "wizard", 0.9), Duration::from_secs(60))
        .await;
    cache
        .set("cat", entry("cat on a broom", "wizard", 0.7), Duration::from_secs(3600))
        .await;

    clock.advance(Duration::from_secs(120));

    // Nothing has read the expired row yet; it is still stored but not counted
    assert!(store.get("prompt:owl").await.unwrap().is_some());
    let stats = cache.stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_style.get("wizard"), Some(&1));
    assert!((stats.avg_score - 0.7).abs() < 1e-9);
}
