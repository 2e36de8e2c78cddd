//! Response cache storage
//!
//! The cache is injected into the services as a [`ResponseCache`] over a
//! [`ResponseStore`] backend, so single-instance deployments and tests can
//! run on the in-memory store while production uses MongoDB.

use async_trait::async_trait;
use bson::{doc, Bson, DateTime};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::mongo::MongoCollection;
use crate::db::schemas::CachedResponseDoc;
use crate::types::UltimaError;

/// Default TTL for generated tests
pub const TEST_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default TTL for project reviews
pub const REVIEW_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Storage backend for cached AI responses
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Look up an unexpired entry by namespace and fingerprint
    async fn find(&self, cache_type: &str, hash: &str)
        -> Result<Option<CachedResponseDoc>, UltimaError>;

    /// Store an entry, replacing any existing one for the same key
    async fn put(&self, entry: CachedResponseDoc) -> Result<(), UltimaError>;

    /// Remove expired entries, returning how many were dropped
    async fn sweep(&self) -> Result<u64, UltimaError>;
}

/// MongoDB-backed store; the TTL index handles long-term expiry and
/// `sweep` is a no-op beyond reporting
pub struct MongoResponseStore {
    collection: MongoCollection<CachedResponseDoc>,
}

impl MongoResponseStore {
    pub fn new(collection: MongoCollection<CachedResponseDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl ResponseStore for MongoResponseStore {
    async fn find(
        &self,
        cache_type: &str,
        hash: &str,
    ) -> Result<Option<CachedResponseDoc>, UltimaError> {
        // Filter on expires_at so entries the TTL monitor has not yet
        // removed are still treated as misses
        self.collection
            .find_one(doc! {
                "cache_type": cache_type,
                "hash": hash,
                "expires_at": { "$gt": DateTime::now() },
            })
            .await
    }

    async fn put(&self, entry: CachedResponseDoc) -> Result<(), UltimaError> {
        // Last writer wins on concurrent misses for the same key
        self.collection
            .delete_many(doc! { "cache_type": &entry.cache_type, "hash": &entry.hash })
            .await?;
        self.collection.insert_one(entry).await?;
        Ok(())
    }

    async fn sweep(&self) -> Result<u64, UltimaError> {
        self.collection
            .delete_many(doc! { "expires_at": { "$lte": DateTime::now() } })
            .await
    }
}

/// In-memory store for tests and single-instance deployments
#[derive(Default)]
pub struct MemoryResponseStore {
    entries: DashMap<(String, String), CachedResponseDoc>,
}

impl MemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (test helper)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResponseStore for MemoryResponseStore {
    async fn find(
        &self,
        cache_type: &str,
        hash: &str,
    ) -> Result<Option<CachedResponseDoc>, UltimaError> {
        let key = (cache_type.to_string(), hash.to_string());
        match self.entries.get(&key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.clone())),
            _ => Ok(None),
        }
    }

    async fn put(&self, entry: CachedResponseDoc) -> Result<(), UltimaError> {
        let key = (entry.cache_type.clone(), entry.hash.clone());
        self.entries.insert(key, entry);
        Ok(())
    }

    async fn sweep(&self) -> Result<u64, UltimaError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        Ok((before - self.entries.len()) as u64)
    }
}

/// Cache facade the services call through
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn ResponseStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn ResponseStore>) -> Self {
        Self { store }
    }

    /// Return the cached payload for (kind, hash), or run `compute`,
    /// store its result with the given TTL and return it.
    ///
    /// A failed compute stores nothing, so the next request retries.
    pub async fn get_or_compute<F, Fut>(
        &self,
        kind: &str,
        hash: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(Bson, bool), UltimaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bson, UltimaError>>,
    {
        if let Some(entry) = self.store.find(kind, hash).await? {
            debug!(kind, hash, "cache hit");
            return Ok((entry.result, true));
        }

        debug!(kind, hash, "cache miss, computing");
        let result = compute().await?;

        let entry = CachedResponseDoc::new(kind.to_string(), hash.to_string(), result.clone(), ttl);
        if let Err(e) = self.store.put(entry).await {
            // Serving the fresh result matters more than caching it
            warn!(kind, hash, error = %e, "failed to store cache entry");
        }

        Ok((result, false))
    }

    /// Look up an unexpired entry directly
    pub async fn find(&self, kind: &str, hash: &str) -> Result<Option<Bson>, UltimaError> {
        Ok(self.store.find(kind, hash).await?.map(|entry| entry.result))
    }

    /// Store a payload directly
    pub async fn put(
        &self,
        kind: &str,
        hash: &str,
        payload: Bson,
        ttl: Duration,
    ) -> Result<(), UltimaError> {
        let entry = CachedResponseDoc::new(kind.to_string(), hash.to_string(), payload, ttl);
        self.store.put(entry).await
    }

    /// Remove expired entries
    pub async fn sweep(&self) -> Result<u64, UltimaError> {
        self.store.sweep().await
    }
}

/// Periodically drop expired entries from the injected store
pub fn spawn_sweep_task(cache: ResponseCache, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match cache.sweep().await {
                Ok(0) => {}
                Ok(n) => info!("cache sweep dropped {} expired entries", n),
                Err(e) => warn!("cache sweep failed: {}", e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (ResponseCache, Arc<MemoryResponseStore>) {
        let store = Arc::new(MemoryResponseStore::new());
        (ResponseCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_hit_skips_compute() {
        let (cache, _store) = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let (payload, _) = cache
                .get_or_compute("test", "k1", TEST_TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Bson::String("generated".into()))
                })
                .await
                .unwrap();
            assert_eq!(payload, Bson::String("generated".into()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_flag() {
        let (cache, _store) = cache();
        let (_, hit) = cache
            .get_or_compute("test", "k1", TEST_TTL, || async { Ok(Bson::Int32(1)) })
            .await
            .unwrap();
        assert!(!hit);

        let (_, hit) = cache
            .get_or_compute("test", "k1", TEST_TTL, || async { Ok(Bson::Int32(2)) })
            .await
            .unwrap();
        assert!(hit);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let (cache, store) = cache();

        let mut entry = CachedResponseDoc::new(
            "test".into(),
            "k1".into(),
            Bson::String("stale".into()),
            Duration::from_secs(60),
        );
        entry.expires_at = DateTime::from_millis(DateTime::now().timestamp_millis() - 1000);
        store.put(entry).await.unwrap();

        let (payload, hit) = cache
            .get_or_compute("test", "k1", TEST_TTL, || async {
                Ok(Bson::String("fresh".into()))
            })
            .await
            .unwrap();

        assert!(!hit);
        assert_eq!(payload, Bson::String("fresh".into()));
    }

    #[tokio::test]
    async fn test_failed_compute_stores_nothing() {
        let (cache, store) = cache();

        let result = cache
            .get_or_compute("review", "k1", REVIEW_TTL, || async {
                Err::<Bson, _>(UltimaError::Upstream("model unavailable".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());

        // Next request retries the compute
        let (payload, hit) = cache
            .get_or_compute("review", "k1", REVIEW_TTL, || async {
                Ok(Bson::String("recovered".into()))
            })
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(payload, Bson::String("recovered".into()));
    }

    #[tokio::test]
    async fn test_namespaces_are_distinct() {
        let (cache, _store) = cache();

        cache
            .get_or_compute("test", "same-hash", TEST_TTL, || async {
                Ok(Bson::String("a test".into()))
            })
            .await
            .unwrap();

        let (payload, hit) = cache
            .get_or_compute("review", "same-hash", REVIEW_TTL, || async {
                Ok(Bson::String("a review".into()))
            })
            .await
            .unwrap();

        assert!(!hit);
        assert_eq!(payload, Bson::String("a review".into()));
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_only() {
        let (cache, store) = cache();

        let live = CachedResponseDoc::new(
            "test".into(),
            "live".into(),
            Bson::Int32(1),
            Duration::from_secs(60),
        );
        let mut dead = CachedResponseDoc::new(
            "test".into(),
            "dead".into(),
            Bson::Int32(2),
            Duration::from_secs(60),
        );
        dead.expires_at = DateTime::from_millis(DateTime::now().timestamp_millis() - 1000);

        store.put(live).await.unwrap();
        store.put(dead).await.unwrap();

        assert_eq!(cache.sweep().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}
