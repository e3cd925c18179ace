/// Read-through caching over a [`Cache`](crate::db::Cache).
///
/// Looks the key up first. On a hit the cached value is returned. On a miss,
/// or when the cache cannot be read, the block is awaited, its value is
/// queued for a background write and returned.
///
/// Cache failures never fail the caller; they are logged and the block runs.
///
/// # Arguments
/// * `$cache`: a `Cache` with `get_from_cache` and `set_in_background`.
/// * `$key`: the `CacheKey` for the value.
/// * `$ttl`: time-to-live in seconds.
/// * `$block`: a future yielding `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let key = CacheKey::FilmSearch { text: text.clone(), rows: limit };
/// let films: AppResult<Vec<Film>> = cached!(cache, key, 60, async {
///     catalog.search(&text, &HashSet::new(), limit).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %$key, "Cache hit");
                Ok(cached)
            }
            other => {
                if let Err(e) = other {
                    tracing::warn!(key = %$key, error = %e, "Cache read failed, computing value");
                }
                match $block.await {
                    Ok(value) => {
                        $cache.set_in_background(&$key, &value, $ttl);
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }};
}
