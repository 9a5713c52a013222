use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::{db::CacheKey, error::AppResult, models::CachedRecommendations};

/// Storage for computed recommendation lists
///
/// Method names mirror the Redis cache so the `cached!` macro works against
/// any implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationCache: Send + Sync {
    /// Returns the cached list for `key`, if any
    async fn get_from_cache(&self, key: &CacheKey) -> AppResult<Option<CachedRecommendations>>;

    /// Stores a list without waiting for the write to land
    fn set_in_background(&self, key: &CacheKey, value: &CachedRecommendations, ttl: u64);

    /// Evicts `key` before returning
    async fn delete(&self, key: &CacheKey) -> AppResult<()>;
}

struct Entry {
    value: CachedRecommendations,
    expires_at: Instant,
}

/// In-process recommendation cache with per-entry expiry
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    deletes: Arc<AtomicUsize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of delete calls served so far
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let entries = self.lock();
        entries
            .get(&key.to_string())
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl RecommendationCache for MemoryCache {
    async fn get_from_cache(&self, key: &CacheKey) -> AppResult<Option<CachedRecommendations>> {
        let mut entries = self.lock();
        let key = key.to_string();

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_in_background(&self, key: &CacheKey, value: &CachedRecommendations, ttl: u64) {
        let entry = Entry {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        };
        self.lock().insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &CacheKey) -> AppResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.lock().remove(&key.to_string());
        Ok(())
    }
}
