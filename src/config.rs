use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL database connection URL; in-memory stores are used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL; search results are not cached when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Directory poster images are written under
    #[serde(default = "default_media_root")]
    pub media_root: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of films returned by a catalog search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Seconds a cached search result stays valid
    #[serde(default = "default_search_cache_ttl")]
    pub search_cache_ttl: u64,

    /// Size of the PostgreSQL connection pool
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
}

fn default_media_root() -> String {
    "media".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_search_limit() -> usize {
    50
}

fn default_search_cache_ttl() -> u64 {
    60
}

fn default_db_max_connections() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            media_root: default_media_root(),
            host: default_host(),
            port: default_port(),
            search_limit: default_search_limit(),
            search_cache_ttl: default_search_cache_ttl(),
            db_max_connections: default_db_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Socket address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
