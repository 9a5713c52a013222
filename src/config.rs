use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL database connection URL. The in-memory store is used when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL. The in-memory recommendation cache is used when unset.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-user favorites cap
    #[serde(default = "default_favorites_limit")]
    pub favorites_limit: usize,

    /// Number of books returned per recommendation job
    #[serde(default = "default_recommendation_count")]
    pub recommendation_count: usize,

    /// Worker tasks draining the recommendation queue
    #[serde(default = "default_recommendation_workers")]
    pub recommendation_workers: usize,

    /// Seconds a computed recommendation list stays cached
    #[serde(default = "default_recommendation_cache_ttl")]
    pub recommendation_cache_ttl: u64,

    /// Seconds a finished job stays pollable
    #[serde(default = "default_job_result_ttl")]
    pub job_result_ttl: u64,

    /// Directory with authors.json, series.json, books.json and list.json to seed from
    #[serde(default)]
    pub catalog_data_dir: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_favorites_limit() -> usize {
    20
}

fn default_recommendation_count() -> usize {
    5
}

fn default_recommendation_workers() -> usize {
    2
}

fn default_recommendation_cache_ttl() -> u64 {
    3600
}

fn default_job_result_ttl() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of key/value pairs
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
