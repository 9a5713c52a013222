use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::BookSummary,
    services::vectorizer::{SimilarityIndex, VectorModel},
};

/// Content-based recommender over a lazily built TF-IDF model of the catalog
///
/// The model is built on first use and shared by every caller until
/// [`Recommender::invalidate`] drops it. A failed build leaves no model behind,
/// so the next call retries.
pub struct Recommender {
    store: Arc<dyn CatalogStore>,
    model: RwLock<Option<Arc<VectorModel>>>,
    build_lock: Mutex<()>,
    generation: AtomicU64,
}

impl Recommender {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            model: RwLock::new(None),
            build_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the current model, building it if needed
    ///
    /// Concurrent first callers wait on a single build.
    pub async fn model(&self) -> AppResult<Arc<VectorModel>> {
        if let Some(model) = self.model.read().await.as_ref() {
            return Ok(model.clone());
        }

        let _guard = self.build_lock.lock().await;
        if let Some(model) = self.model.read().await.as_ref() {
            return Ok(model.clone());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let books = self.store.list_book_summaries().await?;
        let book_count = books.len();

        let model = tokio::task::spawn_blocking(move || VectorModel::build(books))
            .await
            .map_err(|e| AppError::Internal(format!("Vector model build panicked: {}", e)))?;
        let model = Arc::new(model);

        tracing::info!(
            books = book_count,
            vocabulary = model.vocabulary_size(),
            "Vector model built"
        );

        // An invalidation during the build means the catalog moved on; serve
        // this model to the current caller but do not keep it. The generation
        // is compared under the write guard that `invalidate` also takes.
        let mut slot = self.model.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *slot = Some(model.clone());
        } else {
            tracing::debug!("Catalog changed during build, discarding vector model");
        }

        Ok(model)
    }

    /// Drops the current model so the next call rebuilds from the catalog
    pub async fn invalidate(&self) {
        let mut slot = self.model.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if slot.take().is_some() {
            tracing::info!("Vector model invalidated");
        }
    }

    pub async fn is_built(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Up to `n` books most similar to the centroid of the user's favorites
    ///
    /// Books the user already favorited are never returned. Users without
    /// favorites, or whose favorites all postdate the model, get an empty list.
    pub async fn recommend(&self, user_id: i64, n: usize) -> AppResult<Vec<BookSummary>> {
        let model = self.model().await?;

        let favorites = self.store.list_favorites(user_id).await?;
        if favorites.is_empty() || n == 0 {
            return Ok(Vec::new());
        }

        let favorite_ids: HashSet<String> =
            favorites.iter().map(|f| f.book.book_id.clone()).collect();

        let mut rows = Vec::with_capacity(favorites.len());
        for favorite in &favorites {
            match model.position(&favorite.book.book_id) {
                Some(row) => rows.push(row),
                None => tracing::warn!(
                    user_id,
                    book_id = %favorite.book.book_id,
                    "Favorite missing from vector model, skipping"
                ),
            }
        }

        if rows.is_empty() {
            tracing::debug!(user_id, "No favorites present in vector model");
            return Ok(Vec::new());
        }

        let recommended = tokio::task::spawn_blocking(move || {
            let Some(centroid) = model.centroid(&rows) else {
                return Vec::new();
            };
            model
                .rank(&centroid)
                .into_iter()
                .filter_map(|(row, _)| model.book(row))
                .filter(|book| !favorite_ids.contains(&book.book_id))
                .take(n)
                .cloned()
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| AppError::Internal(format!("Similarity ranking panicked: {}", e)))?;

        tracing::info!(
            user_id,
            favorites = favorites.len(),
            count = recommended.len(),
            "Recommendations computed"
        );

        Ok(recommended)
    }
}
