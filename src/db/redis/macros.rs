/// A macro to simplify read-through caching of values that can go stale.
///
/// A cached value is returned only if `$fresh` accepts it. Otherwise the
/// block is awaited, and its result is written back only if `$fresh` still
/// accepts it. A value computed against state that changed mid-flight is
/// returned to the caller but never cached.
///
/// # Arguments
/// * `$cache`: The cache instance to use for retrieval and storage. The cache must have
///   `get_from_cache` and `set_in_background` methods.
/// * `$key`: The key to use for caching the value.
/// * `$ttl`: The time-to-live (TTL) for the cached value in seconds.
/// * `$fresh`: Predicate over `&value` deciding whether it may be served or stored.
/// * `$block`: The future to await if no fresh value is cached.
///
/// # Example
/// ```rust,ignore
/// let entry = cached!(cache, key, ttl, |e: &CachedRecommendations| e.epoch == epochs.current(user_id), async move {
///     compute(user_id).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $fresh:expr, $block:expr) => {{
        let fresh = $fresh;
        match $cache.get_from_cache(&$key).await? {
            Some(cached) if fresh(&cached) => {
                tracing::debug!(key = %$key, "Cache hit");
                Ok(cached)
            }
            stale => {
                if stale.is_some() {
                    tracing::debug!(key = %$key, "Cached value is stale");
                }
                let value = $block.await?;
                if fresh(&value) {
                    $cache.set_in_background(&$key, &value, $ttl);
                } else {
                    tracing::debug!(key = %$key, "Inputs changed during compute, not caching");
                }
                Ok(value)
            }
        }
    }};
}
