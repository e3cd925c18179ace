use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::AppResult,
    models::Film,
    store::CatalogStore,
};

/// Substring search over the shared catalog
///
/// Raw matches may be cached. Per-user exclusion runs after the cache, and
/// the cached row count is `limit` plus the number of excluded titles, so a
/// cached result is shared by every user who excludes the same number of
/// titles and still leaves `limit` rows after exclusion.
pub struct CatalogSearch {
    catalog: Arc<dyn CatalogStore>,
    cache: Option<Cache>,
    cache_ttl: u64,
    limit: usize,
}

impl CatalogSearch {
    pub fn new(catalog: Arc<dyn CatalogStore>, limit: usize) -> Self {
        Self {
            catalog,
            cache: None,
            cache_ttl: 0,
            limit,
        }
    }

    pub fn with_cache(mut self, cache: Cache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    /// Films whose title contains `text` (case-insensitive), excluding any
    /// title in `exclude`
    ///
    /// Blank text yields no results.
    pub async fn search(&self, text: &str, exclude: &HashSet<String>) -> AppResult<Vec<Film>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let Some(cache) = &self.cache else {
            return self.catalog.search(text, exclude, self.limit).await;
        };

        // Fetch enough raw matches that `limit` survive the exclusion
        let raw_limit = self.limit + exclude.len();
        let key = CacheKey::FilmSearch {
            text: text.to_string(),
            rows: raw_limit,
        };
        let catalog = self.catalog.clone();
        let no_exclusions = HashSet::new();
        let raw: AppResult<Vec<Film>> = cached!(cache, key, self.cache_ttl, async {
            catalog.search(text, &no_exclusions, raw_limit).await
        });

        let mut films = raw?;
        films.retain(|film| !exclude.contains(&film.title));
        films.truncate(self.limit);

        tracing::debug!(
            text = %text,
            results = films.len(),
            excluded = exclude.len(),
            "Catalog search"
        );

        Ok(films)
    }
}
