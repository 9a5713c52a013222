use serde::{Deserialize, Serialize};

use super::BookSummary;

/// Catalog and favorites versions a recommendation list was computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEpoch {
    pub catalog: u64,
    pub favorites: u64,
}

/// A recommendation list as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecommendations {
    pub epoch: RecommendationEpoch,
    pub books: Vec<BookSummary>,
}
