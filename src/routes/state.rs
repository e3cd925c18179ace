use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    config::Config,
    db::{self, Cache, CacheWriterHandle},
    services::{CatalogSearch, ListEvents, ListOrderingEngine},
    store::{
        CatalogStore, FsImageStore, ImageStore, InMemoryCatalog, InMemoryMembership,
        MembershipStore, PgCatalog, PgMembership,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ListOrderingEngine>,
    pub search: Arc<CatalogSearch>,
}

impl AppState {
    pub fn new(engine: ListOrderingEngine, search: CatalogSearch) -> Self {
        Self {
            engine: Arc::new(engine),
            search: Arc::new(search),
        }
    }

    /// State backed by process-local stores, with images written under `media_root`
    pub fn in_memory(media_root: impl Into<PathBuf>, search_limit: usize) -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalog::new());
        let membership: Arc<dyn MembershipStore> = Arc::new(InMemoryMembership::new());
        let images: Arc<dyn ImageStore> = Arc::new(FsImageStore::new(media_root));

        Self::new(
            ListOrderingEngine::new(catalog.clone(), membership, images, ListEvents::new()),
            CatalogSearch::new(catalog, search_limit),
        )
    }

    /// Builds state from configuration
    ///
    /// Uses PostgreSQL when `database_url` is set and enables the search cache
    /// when `redis_url` is set. The returned handle flushes the cache writer on
    /// shutdown.
    pub async fn from_config(config: &Config) -> anyhow::Result<(Self, Option<CacheWriterHandle>)> {
        let (catalog, membership): (Arc<dyn CatalogStore>, Arc<dyn MembershipStore>) =
            match &config.database_url {
                Some(url) => {
                    let pool = db::create_pool(url, config.db_max_connections).await?;
                    db::run_migrations(&pool).await?;
                    tracing::info!("Using PostgreSQL stores");
                    (
                        Arc::new(PgCatalog::new(pool.clone())),
                        Arc::new(PgMembership::new(pool)),
                    )
                }
                None => {
                    tracing::warn!("DATABASE_URL not set, using in-memory stores");
                    (
                        Arc::new(InMemoryCatalog::new()),
                        Arc::new(InMemoryMembership::new()),
                    )
                }
            };

        let images: Arc<dyn ImageStore> = Arc::new(FsImageStore::new(&config.media_root));
        let engine = ListOrderingEngine::new(catalog.clone(), membership, images, ListEvents::new());

        let mut search = CatalogSearch::new(catalog, config.search_limit);
        let mut cache_handle = None;
        if let Some(url) = &config.redis_url {
            let client = db::create_redis_client(url)?;
            let (cache, handle) = Cache::redis(client);
            search = search.with_cache(cache, config.search_cache_ttl);
            cache_handle = Some(handle);
            tracing::info!(ttl = config.search_cache_ttl, "Search cache enabled");
        }

        Ok((Self::new(engine, search), cache_handle))
    }
}
