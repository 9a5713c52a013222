use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BookSummary;

/// A user's favorited book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserFavorite {
    pub user_id: i64,
    pub book: BookSummary,
    pub added_at: DateTime<Utc>,
}

/// Outcome of a favorite insert at the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteInsert {
    Added,
    AlreadyPresent,
    LimitReached,
}
