use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_api::{
    config::Config,
    db::{self, CatalogStore, MemoryCache, MemoryStore, PgStore, RecommendationCache},
    routes::{create_router, AppState},
    services::CatalogLoader,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn CatalogStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Connected to Postgres");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory catalog");
            Arc::new(MemoryStore::new())
        }
    };

    let mut cache_writer = None;
    let cache: Arc<dyn RecommendationCache> = match &config.redis_url {
        Some(url) => {
            let client = db::create_redis_client(url)?;
            let (cache, handle) = db::Cache::new(client).await;
            cache_writer = Some(handle);
            tracing::info!("Using Redis recommendation cache");
            Arc::new(cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory recommendation cache");
            Arc::new(MemoryCache::new())
        }
    };

    if let Some(dir) = &config.catalog_data_dir {
        CatalogLoader::new(store.as_ref()).load_dir(dir).await?;
    }

    let state = Arc::new(AppState::new(store, cache, &config));
    let app = create_router(state).layer(CorsLayer::permissive());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
