//! Read-through product cache and its invalidator

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ProductResult;

/// How long a cached product read stays valid
pub const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Cache key for a product record
pub fn product_cache_key(id: i64) -> String {
    format!("product:{}", id)
}

/// Key/value cache holding serialized products
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductCache: Send + Sync {
    async fn get(&self, key: &str) -> ProductResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ProductResult<()>;

    async fn delete(&self, key: &str) -> ProductResult<()>;
}

/// Redis-backed [`ProductCache`]
#[derive(Clone)]
pub struct RedisProductCache {
    redis: ConnectionManager,
}

impl RedisProductCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ProductCache for RedisProductCache {
    async fn get(&self, key: &str) -> ProductResult<Option<String>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ProductResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> ProductResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Drops cached reads of a product after its record changes.
///
/// Called after the mutation has committed and before the caller is
/// answered. Failures are logged and swallowed; the entry then expires on
/// its TTL.
pub struct CacheInvalidator<C: ProductCache> {
    cache: Arc<C>,
}

impl<C: ProductCache> Clone for CacheInvalidator<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<C: ProductCache> CacheInvalidator<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    pub async fn invalidate(&self, product_id: i64) {
        let key = product_cache_key(product_id);
        match self.cache.delete(&key).await {
            Ok(()) => debug!(key = %key, "Cache entry invalidated"),
            Err(e) => warn!(key = %key, error = %e, "Failed to invalidate cache entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProductError;

    #[test]
    fn test_cache_key() {
        assert_eq!(product_cache_key(42), "product:42");
    }

    #[tokio::test]
    async fn test_invalidate_deletes_product_key() {
        let mut cache = MockProductCache::new();
        cache
            .expect_delete()
            .withf(|key| key == "product:7")
            .times(1)
            .returning(|_| Ok(()));

        CacheInvalidator::new(Arc::new(cache)).invalidate(7).await;
    }

    #[tokio::test]
    async fn test_invalidate_swallows_cache_errors() {
        let mut cache = MockProductCache::new();
        cache
            .expect_delete()
            .times(1)
            .returning(|_| Err(ProductError::Cache("connection reset".into())));

        // Must not panic or propagate
        CacheInvalidator::new(Arc::new(cache)).invalidate(7).await;
    }
}
