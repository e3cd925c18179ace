//! Read-through cache for catalog search results.
//!
//! [`Cache`] handles JSON encoding and delegates storage to a
//! [`CacheBackend`]. The Redis backend answers reads directly and hands writes
//! to a background task, so a search response never waits on a cache write.

use std::fmt::Display;
use std::sync::Arc;

use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Raw catalog matches for a search text before per-user exclusion.
    /// `rows` is how many matches were fetched.
    FilmSearch { text: String, rows: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::FilmSearch { text, rows } => {
                write!(f, "search:{}:{}", rows, text.trim().to_lowercase())
            }
        }
    }
}

/// Opens a Redis client; no connection is made until first use
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// Raw string storage behind [`Cache`]
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Queues a write that expires after `ttl` seconds; must not block
    fn put(&self, key: String, value: String, ttl: u64);
}

/// JSON values cached under [`CacheKey`]s
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// A Redis-backed cache plus the handle that stops its writer
    pub fn redis(client: Client) -> (Self, CacheWriterHandle) {
        let (backend, handle) = RedisBackend::spawn(client);
        (Self::new(Arc::new(backend)), handle)
    }

    /// The cached value for `key`, if present and decodable
    pub async fn get_from_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let Some(json) = self.backend.get(&key.to_string()).await? else {
            return Ok(None);
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| AppError::Internal(format!("Cached value for {} is malformed: {}", key, e)))
    }

    /// Encodes `value` and queues it for storage without waiting
    pub fn set_in_background<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        match serde_json::to_string(value) {
            Ok(json) => self.backend.put(key.to_string(), json, ttl),
            Err(e) => tracing::error!(key = %key, error = %e, "Failed to encode cache value"),
        }
    }
}

struct PendingWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// Outcome counts reported by the Redis writer when it stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

/// Stops the Redis writer after it drains queued writes
///
/// Dropping the handle stops the writer too; later writes are discarded.
pub struct CacheWriterHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<WriterStats>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) -> WriterStats {
        let _ = self.shutdown_tx.send(());
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Cache writer task failed");
                WriterStats::default()
            }
        }
    }
}

/// Reads from Redis inline; writes go through an unbounded queue to one task
struct RedisBackend {
    client: Client,
    writes: mpsc::UnboundedSender<PendingWrite>,
}

impl RedisBackend {
    fn spawn(client: Client) -> (Self, CacheWriterHandle) {
        let (writes, queue) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_writer(client.clone(), queue, shutdown_rx));

        (
            Self { client, writes },
            CacheWriterHandle { shutdown_tx, task },
        )
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(key).await?)
    }

    fn put(&self, key: String, value: String, ttl: u64) {
        if self.writes.send(PendingWrite { key, value, ttl }).is_err() {
            tracing::warn!("Cache writer stopped, dropping write");
        }
    }
}

async fn run_writer(
    client: Client,
    mut queue: mpsc::UnboundedReceiver<PendingWrite>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> WriterStats {
    let mut stats = WriterStats::default();

    let mut record = |key: &str, result: AppResult<()>| match result {
        Ok(()) => stats.written += 1,
        Err(e) => {
            stats.failed += 1;
            tracing::error!(key, error = %e, "Cache write failed");
        }
    };

    loop {
        tokio::select! {
            Some(write) = queue.recv() => {
                let key = write.key.clone();
                record(&key, store(&client, write).await);
            }
            _ = &mut shutdown_rx => break,
        }
    }

    // Senders may outlive this task, so drain only what is already queued
    while let Ok(write) = queue.try_recv() {
        let key = write.key.clone();
        record(&key, store(&client, write).await);
    }

    tracing::info!(
        written = stats.written,
        failed = stats.failed,
        "Cache writer stopped"
    );
    stats
}

async fn store(client: &Client, write: PendingWrite) -> AppResult<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: () = conn.set_ex(write.key, write.value, write.ttl).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_key(text: &str, rows: usize) -> CacheKey {
        CacheKey::FilmSearch {
            text: text.to_string(),
            rows,
        }
    }

    #[test]
    fn test_search_key_normalizes_text() {
        assert_eq!(search_key("Alien", 50).to_string(), "search:50:alien");
        assert_eq!(search_key("  THE THING ", 7).to_string(), "search:7:the thing");
    }

    #[tokio::test]
    async fn test_get_decodes_json() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .withf(|key| key == "search:5:heat")
            .returning(|_| Ok(Some(r#"["Heat","Heat 2"]"#.to_string())));

        let cache = Cache::new(Arc::new(backend));
        let titles: Option<Vec<String>> = cache.get_from_cache(&search_key("Heat", 5)).await.unwrap();

        assert_eq!(titles, Some(vec!["Heat".to_string(), "Heat 2".to_string()]));
    }

    #[tokio::test]
    async fn test_malformed_value_is_an_error() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Ok(Some("not json".to_string())));

        let cache = Cache::new(Arc::new(backend));
        let result: AppResult<Option<Vec<String>>> = cache.get_from_cache(&search_key("x", 1)).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_set_encodes_and_queues() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_put()
            .withf(|key, value, ttl| key == "search:2:ran" && value == r#"["Ran"]"# && *ttl == 30)
            .times(1)
            .return_const(());

        let cache = Cache::new(Arc::new(backend));
        cache.set_in_background(&search_key("Ran", 2), &vec!["Ran"], 30);
    }

    #[tokio::test]
    async fn test_writer_counts_failed_writes_and_drains_on_shutdown() {
        // Nothing listens on port 1, so every write fails
        let client = create_redis_client("redis://127.0.0.1:1/").unwrap();
        let (cache, handle) = Cache::redis(client);

        cache.set_in_background(&search_key("alien", 1), &vec!["Alien"], 60);
        cache.set_in_background(&search_key("heat", 1), &vec!["Heat"], 60);

        let stats = handle.shutdown().await;
        assert_eq!(
            stats,
            WriterStats {
                written: 0,
                failed: 2
            }
        );
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_redis_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&url).unwrap();
        let (cache, handle) = Cache::redis(client.clone());

        let key = search_key("round_trip_test", 1);
        cache.set_in_background(&key, &vec!["Alien".to_string()], 60);
        assert_eq!(handle.shutdown().await.written, 1);

        let cached: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(cached, Some(vec!["Alien".to_string()]));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
