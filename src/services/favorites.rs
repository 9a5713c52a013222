use std::sync::Arc;

use crate::{
    db::{CacheKey, CatalogStore, RecommendationCache},
    error::{AppError, AppResult},
    models::{favorite::FavoriteInsert, UserFavorite},
    services::epochs::RecommendationEpochs,
};

/// Favorite mutations with recommendation cache eviction
///
/// Every change to a user's favorite set moves the user's favorites epoch and
/// deletes their cached recommendations before returning. The epoch keeps a
/// job that was already running from caching a list computed from the old set.
pub struct FavoritesService {
    store: Arc<dyn CatalogStore>,
    cache: Arc<dyn RecommendationCache>,
    epochs: Arc<RecommendationEpochs>,
    limit: usize,
}

impl FavoritesService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn RecommendationCache>,
        epochs: Arc<RecommendationEpochs>,
        limit: usize,
    ) -> Self {
        Self {
            store,
            cache,
            epochs,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn list_favorites(&self, user_id: i64) -> AppResult<Vec<UserFavorite>> {
        self.store.list_favorites(user_id).await
    }

    /// Favorites `book_id` for `user_id`
    ///
    /// Re-favoriting a book is a no-op. The cap is checked by the store and is
    /// best effort under concurrent adds for the same user.
    pub async fn add_favorite(&self, user_id: i64, book_id: &str) -> AppResult<FavoriteInsert> {
        let outcome = self.store.add_favorite(user_id, book_id, self.limit).await?;

        match outcome {
            FavoriteInsert::Added => {
                tracing::info!(user_id, book_id, "Favorite added");
                self.invalidate(user_id).await?;
            }
            FavoriteInsert::AlreadyPresent => {
                tracing::debug!(user_id, book_id, "Book already a favorite");
            }
            FavoriteInsert::LimitReached => {
                tracing::info!(user_id, book_id, limit = self.limit, "Favorites limit reached");
                return Err(AppError::FavoritesLimit(self.limit));
            }
        }

        Ok(outcome)
    }

    /// Removes `book_id` from the user's favorites; fails if the book does not exist
    pub async fn remove_favorite(&self, user_id: i64, book_id: &str) -> AppResult<bool> {
        if self.store.get_book(book_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Book {}", book_id)));
        }

        let removed = self.store.remove_favorite(user_id, book_id).await?;
        if removed {
            tracing::info!(user_id, book_id, "Favorite removed");
            self.invalidate(user_id).await?;
        }
        Ok(removed)
    }

    async fn invalidate(&self, user_id: i64) -> AppResult<()> {
        self.epochs.favorites_changed(user_id);
        self.cache
            .delete(&CacheKey::UserRecommendations(user_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{cache::MockRecommendationCache, MemoryCache, MemoryStore};
    use crate::models::{Book, CachedRecommendations};

    async fn store_with_books(count: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 0..count {
            store
                .create_book(Book::new(format!("b{}", i), format!("Book {}", i)))
                .await
                .unwrap();
        }
        store
    }

    fn service_over(store: Arc<MemoryStore>, cache: Arc<dyn RecommendationCache>) -> FavoritesService {
        FavoritesService::new(store, cache, Arc::new(RecommendationEpochs::new()), 20)
    }

    #[tokio::test]
    async fn test_add_then_remove_deletes_cache_key_once_each() {
        let store = store_with_books(1).await;
        let mut cache = MockRecommendationCache::new();
        cache
            .expect_delete()
            .withf(|key| *key == CacheKey::UserRecommendations(7))
            .times(2)
            .returning(|_| Ok(()));

        let service = service_over(store, Arc::new(cache));
        assert_eq!(service.add_favorite(7, "b0").await.unwrap(), FavoriteInsert::Added);
        assert!(service.remove_favorite(7, "b0").await.unwrap());
    }

    #[tokio::test]
    async fn test_twenty_first_favorite_is_rejected() {
        let store = store_with_books(21).await;
        let cache = Arc::new(MemoryCache::new());
        let service = service_over(store, cache.clone());

        for i in 0..20 {
            service.add_favorite(1, &format!("b{}", i)).await.unwrap();
        }

        let result = service.add_favorite(1, "b20").await;
        assert!(matches!(result, Err(AppError::FavoritesLimit(20))));
        assert_eq!(service.list_favorites(1).await.unwrap().len(), 20);
        assert_eq!(cache.delete_count(), 20);
    }

    #[tokio::test]
    async fn test_refavorite_is_idempotent_and_keeps_cache() {
        let store = store_with_books(1).await;
        let cache = Arc::new(MemoryCache::new());
        let service = service_over(store, cache.clone());

        service.add_favorite(1, "b0").await.unwrap();
        assert_eq!(
            service.add_favorite(1, "b0").await.unwrap(),
            FavoriteInsert::AlreadyPresent
        );
        assert_eq!(service.list_favorites(1).await.unwrap().len(), 1);
        assert_eq!(cache.delete_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_book_is_not_found() {
        let store = store_with_books(0).await;
        let service = service_over(store, Arc::new(MemoryCache::new()));

        assert!(matches!(
            service.add_favorite(1, "missing").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.remove_favorite(1, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_removing_non_favorite_leaves_cache_alone() {
        let store = store_with_books(1).await;
        let cache = Arc::new(MemoryCache::new());
        let service = service_over(store, cache.clone());

        assert!(!service.remove_favorite(1, "b0").await.unwrap());
        assert_eq!(cache.delete_count(), 0);
    }

    #[tokio::test]
    async fn test_favorite_change_evicts_cached_recommendations() {
        let store = store_with_books(2).await;
        let cache = Arc::new(MemoryCache::new());
        let epochs = Arc::new(RecommendationEpochs::new());
        let key = CacheKey::UserRecommendations(3);
        let before = epochs.current(3);
        let entry = CachedRecommendations {
            epoch: before,
            books: Vec::new(),
        };
        cache.set_in_background(&key, &entry, 60);

        let service = FavoritesService::new(store, cache.clone(), epochs.clone(), 20);
        service.add_favorite(3, "b1").await.unwrap();
        assert!(!cache.contains(&key));
        assert!(!epochs.is_current(3, &before));
    }
}
