use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::models::RecommendationEpoch;

/// Version counters that decide whether a cached recommendation list is current
///
/// The catalog counter moves on every catalog write and each user's counter
/// on every change to their favorites. A cached list is fresh only while
/// both match the values recorded before it was computed. The catalog
/// counter starts from the process start time so lists cached by an earlier
/// process are never taken as fresh.
pub struct RecommendationEpochs {
    catalog: AtomicU64,
    favorites: Mutex<HashMap<i64, u64>>,
}

impl Default for RecommendationEpochs {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationEpochs {
    pub fn new() -> Self {
        let start = u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or_default();
        Self {
            catalog: AtomicU64::new(start),
            favorites: Mutex::new(HashMap::new()),
        }
    }

    pub fn current(&self, user_id: i64) -> RecommendationEpoch {
        RecommendationEpoch {
            catalog: self.catalog.load(Ordering::SeqCst),
            favorites: self.lock().get(&user_id).copied().unwrap_or(0),
        }
    }

    pub fn is_current(&self, user_id: i64, epoch: &RecommendationEpoch) -> bool {
        self.current(user_id) == *epoch
    }

    pub fn favorites_changed(&self, user_id: i64) {
        *self.lock().entry(user_id).or_insert(0) += 1;
    }

    pub fn catalog_changed(&self) {
        self.catalog.fetch_add(1, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, u64>> {
        self.favorites.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
