pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use self::cache::{MemoryCache, RecommendationCache};
pub use self::memory::MemoryStore;
pub use self::postgres::{create_pool, run_migrations, PgStore};
pub use self::redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
pub use self::store::CatalogStore;
