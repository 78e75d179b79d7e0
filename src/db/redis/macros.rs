/// Read-through caching for eBird API responses.
///
/// Returns the value cached under `$key` when there is one. Otherwise awaits
/// `$fetch`, queues the result for a background write with the given TTL
/// (seconds) and returns it. A failed cache read counts as a miss, so an
/// unreachable Redis slows lookups down but never fails them. Expands to an
/// `AppResult`, so it reads best as the tail of a function returning one.
///
/// # Example
/// ```rust,ignore
/// async fn checklist(&self, sub_id: &str) -> AppResult<ApiChecklistView> {
///     cached!(self.cache, CacheKey::Checklist(sub_id.to_string()), TTL, async {
///         self.get_json(&url).await
///     })
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $fetch:expr) => {{
        let key = $key;
        let hit = match $cache.get_from_cache(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as a miss");
                None
            }
        };
        match hit {
            Some(hit) => {
                tracing::trace!(key = %key, "Cache hit");
                Ok(hit)
            }
            None => {
                let value = $fetch.await?;
                $cache.set_in_background(&key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use crate::db::{Cache, CacheKey};
    use crate::error::{AppError, AppResult};

    async fn taxonomy_codes(cache: &Cache) -> AppResult<Vec<String>> {
        cached!(cache, CacheKey::Taxonomy, 60, async {
            Ok::<_, AppError>(vec!["amecro".to_string(), "blujay".to_string()])
        })
    }

    #[tokio::test]
    async fn test_unreachable_cache_falls_back_to_fetch() {
        // Nothing listens on port 1, so every read fails
        let client = redis::Client::open("redis://127.0.0.1:1").unwrap();
        let (cache, writer) = Cache::new(client);

        let codes = taxonomy_codes(&cache).await.unwrap();

        assert_eq!(codes, vec!["amecro".to_string(), "blujay".to_string()]);
        writer.shutdown().await;
    }
}
