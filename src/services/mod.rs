pub mod epochs;
pub mod favorites;
pub mod jobs;
pub mod loader;
pub mod recommender;
pub mod vectorizer;

pub use epochs::RecommendationEpochs;
pub use favorites::FavoritesService;
pub use jobs::{JobQueue, JobSettings};
pub use loader::CatalogLoader;
pub use recommender::Recommender;
