use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    db::{CatalogStore, RecommendationCache},
    middleware::request_id::{make_span_with_request_id, request_id_middleware},
    services::{FavoritesService, JobQueue, JobSettings, RecommendationEpochs, Recommender},
};

pub mod authors;
pub mod books;
pub mod favorites;
pub mod lists;
pub mod series;

/// Shared handles for every request
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub recommender: Arc<Recommender>,
    pub epochs: Arc<RecommendationEpochs>,
    pub favorites: FavoritesService,
    pub jobs: JobQueue,
}

impl AppState {
    /// Wires the services over the given backends and starts the recommendation workers
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn RecommendationCache>,
        config: &Config,
    ) -> Self {
        let recommender = Arc::new(Recommender::new(store.clone()));
        let epochs = Arc::new(RecommendationEpochs::new());
        let favorites = FavoritesService::new(
            store.clone(),
            cache.clone(),
            epochs.clone(),
            config.favorites_limit,
        );
        let jobs = JobQueue::start(
            recommender.clone(),
            cache,
            epochs.clone(),
            JobSettings {
                workers: config.recommendation_workers,
                recommendation_count: config.recommendation_count,
                cache_ttl: config.recommendation_cache_ttl,
                result_ttl: Duration::from_secs(config.job_result_ttl),
            },
        );

        Self {
            store,
            recommender,
            epochs,
            favorites,
            jobs,
        }
    }

    /// Call after any write that changes a book's document text
    ///
    /// Drops the vector model and retires every cached recommendation list.
    pub async fn catalog_changed(&self) {
        self.recommender.invalidate().await;
        self.epochs.catalog_changed();
    }
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/authors", get(authors::list).post(authors::create))
        .route(
            "/authors/:id",
            get(authors::get).put(authors::update).delete(authors::delete),
        )
        .route("/series", get(series::list).post(series::create))
        .route("/series/:id", get(series::get))
        .route("/books", get(books::list).post(books::create))
        .route(
            "/books/:id",
            get(books::get).put(books::update).delete(books::delete),
        )
        .route(
            "/books/:id/favorite",
            post(favorites::add).delete(favorites::remove),
        )
        .route("/lists", get(lists::list).post(lists::create))
        .route("/lists/:id", get(lists::get))
        .route("/favorites", get(favorites::list).post(favorites::create))
        .route("/favorites/recommendations", get(favorites::recommendations))
        .route(
            "/favorites/recommendation_status",
            get(favorites::recommendation_status),
        )
        .route("/favorites/:book_id", delete(favorites::destroy))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
