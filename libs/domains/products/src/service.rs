//! Product Service - Business logic layer

use image_pipeline::{Publisher, WorkItem};
use std::sync::Arc;
use tracing::{instrument, warn};
use validator::Validate;

use crate::cache::{CacheInvalidator, PRODUCT_CACHE_TTL, ProductCache, product_cache_key};
use crate::error::{ProductError, ProductResult};
use crate::models::{
    CreateProduct, CreateUser, Product, ProductFilter, ProductRead, ProductSource, ProductSummary,
    UpdateProduct, User,
};
use crate::repository::{ProductRepository, UserRepository};

/// Product service providing business logic operations
///
/// Reads go through the cache; writes invalidate it. New products enqueue
/// one image work item per image.
pub struct ProductService<R: ProductRepository, C: ProductCache> {
    repository: Arc<R>,
    cache: Arc<C>,
    invalidator: CacheInvalidator<C>,
    publisher: Arc<dyn Publisher>,
    image_queue: String,
}

impl<R: ProductRepository, C: ProductCache> ProductService<R, C> {
    pub fn new(
        repository: R,
        cache: C,
        publisher: Arc<dyn Publisher>,
        image_queue: impl Into<String>,
    ) -> Self {
        let cache = Arc::new(cache);
        Self {
            repository: Arc::new(repository),
            invalidator: CacheInvalidator::new(Arc::clone(&cache)),
            cache,
            publisher,
            image_queue: image_queue.into(),
        }
    }

    /// Create a product and enqueue its images for compression.
    ///
    /// Enqueueing is fire-and-forget: publish failures are logged and the
    /// product is still returned.
    #[instrument(skip(self, input), fields(user_id = input.user_id, product_name = %input.product_name))]
    pub async fn create_product(&self, input: CreateProduct) -> ProductResult<Product> {
        input.validate()?;

        let product = self.repository.create(input).await?;

        for image in &product.product_images {
            let item = WorkItem::new(product.id, image.clone());
            if let Err(e) = self.publisher.publish(&self.image_queue, &item.encode()).await {
                warn!(
                    product_id = product.id,
                    image = %image,
                    error = %e,
                    "Failed to enqueue image for processing"
                );
            }
        }

        Ok(product)
    }

    /// Cache-aside read. Cache failures fall back to the database.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i64) -> ProductResult<ProductRead> {
        let key = product_cache_key(id);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Product>(&cached) {
                Ok(product) => {
                    return Ok(ProductRead {
                        data: product,
                        source: ProductSource::Cache,
                    });
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, using database"),
        }

        let product = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(ProductError::NotFound(id))?;

        match serde_json::to_string(&product) {
            Ok(json) => {
                if let Err(e) = self.cache.set(&key, &json, PRODUCT_CACHE_TTL).await {
                    warn!(key = %key, error = %e, "Failed to cache product");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize product for cache"),
        }

        Ok(ProductRead {
            data: product,
            source: ProductSource::Database,
        })
    }

    /// List a user's products
    #[instrument(skip(self))]
    pub async fn list_products(&self, filter: ProductFilter) -> ProductResult<Vec<ProductSummary>> {
        if filter.user_id.is_none() {
            return Err(ProductError::Validation("user_id is required".to_string()));
        }

        if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
            if min > max {
                return Err(ProductError::Validation(
                    "min_price must not exceed max_price".to_string(),
                ));
            }
        }

        let products = self.repository.list(filter).await?;
        Ok(products.into_iter().map(ProductSummary::from).collect())
    }

    /// Replace a product, then invalidate its cached read
    #[instrument(skip(self, input))]
    pub async fn update_product(&self, id: i64, input: UpdateProduct) -> ProductResult<Product> {
        input.validate()?;

        let product = self
            .repository
            .update(id, input)
            .await?
            .ok_or(ProductError::NotFound(id))?;

        self.invalidator.invalidate(id).await;
        Ok(product)
    }

    /// Delete a product, then invalidate its cached read
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i64) -> ProductResult<()> {
        if !self.repository.delete(id).await? {
            return Err(ProductError::NotFound(id));
        }

        self.invalidator.invalidate(id).await;
        Ok(())
    }
}

/// User service
pub struct UserService<U: UserRepository> {
    repository: Arc<U>,
}

impl<U: UserRepository> UserService<U> {
    pub fn new(repository: U) -> Self {
        Self {
            repository: Arc::new(repository),
        }
    }

    #[instrument(skip(self, input), fields(user_id = input.user_id))]
    pub async fn create_user(&self, input: CreateUser) -> ProductResult<User> {
        input.validate()?;
        self.repository.create(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockProductCache;
    use crate::repository::{MockProductRepository, MockUserRepository};
    use async_trait::async_trait;
    use image_pipeline::{InMemoryBroker, WorkerError};

    const QUEUE: &str = "image_processing";

    fn product(id: i64, images: &[&str]) -> Product {
        Product {
            id,
            user_id: 1,
            product_name: "Lamp".into(),
            product_description: "Desk lamp".into(),
            product_images: images.iter().map(|s| s.to_string()).collect(),
            compressed_product_images: vec![],
            product_price: 25.0,
        }
    }

    fn create_input(images: &[&str]) -> CreateProduct {
        CreateProduct {
            user_id: 1,
            product_name: "Lamp".into(),
            product_description: "Desk lamp".into(),
            product_images: images.iter().map(|s| s.to_string()).collect(),
            product_price: 25.0,
        }
    }

    fn update_input() -> UpdateProduct {
        UpdateProduct {
            user_id: 1,
            product_name: "Floor lamp".into(),
            product_description: String::new(),
            product_images: vec![],
            product_price: 40.0,
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, _queue: &str, _payload: &[u8]) -> Result<(), WorkerError> {
            Err(WorkerError::broker("channel closed"))
        }
    }

    fn service(
        repo: MockProductRepository,
        cache: MockProductCache,
        publisher: Arc<dyn Publisher>,
    ) -> ProductService<MockProductRepository, MockProductCache> {
        ProductService::new(repo, cache, publisher, QUEUE)
    }

    #[tokio::test]
    async fn test_create_enqueues_one_item_per_image() {
        let mut repo = MockProductRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|_| Ok(product(12, &["a.jpg", "b.png"])));
        let broker = InMemoryBroker::default();

        let svc = service(repo, MockProductCache::new(), Arc::new(broker.clone()));
        let created = svc.create_product(create_input(&["a.jpg", "b.png"])).await.unwrap();
        assert_eq!(created.id, 12);

        let items: Vec<WorkItem> = broker
            .messages(QUEUE)
            .iter()
            .map(|body| WorkItem::decode(body).unwrap())
            .collect();
        assert_eq!(
            items,
            vec![WorkItem::new(12, "a.jpg"), WorkItem::new(12, "b.png")]
        );
    }

    #[tokio::test]
    async fn test_create_ignores_publish_failures() {
        let mut repo = MockProductRepository::new();
        repo.expect_create()
            .times(1)
            .returning(|_| Ok(product(3, &["a.jpg"])));

        let svc = service(repo, MockProductCache::new(), Arc::new(FailingPublisher));
        assert!(svc.create_product(create_input(&["a.jpg"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let mut repo = MockProductRepository::new();
        repo.expect_create().never();

        let svc = service(repo, MockProductCache::new(), Arc::new(InMemoryBroker::default()));
        let mut input = create_input(&[]);
        input.product_name = String::new();

        let err = svc.create_product(input).await.unwrap_err();
        assert!(matches!(err, ProductError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_product_cache_hit_skips_database() {
        let mut repo = MockProductRepository::new();
        repo.expect_get_by_id().never();

        let cached = serde_json::to_string(&product(5, &["a.jpg"])).unwrap();
        let mut cache = MockProductCache::new();
        cache
            .expect_get()
            .withf(|key| key == "product:5")
            .returning(move |_| Ok(Some(cached.clone())));

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        let read = svc.get_product(5).await.unwrap();

        assert_eq!(read.source, ProductSource::Cache);
        assert_eq!(read.data.id, 5);
    }

    #[tokio::test]
    async fn test_get_product_cache_miss_populates_cache() {
        let mut repo = MockProductRepository::new();
        repo.expect_get_by_id()
            .times(1)
            .returning(|id| Ok(Some(product(id, &[]))));

        let mut cache = MockProductCache::new();
        cache.expect_get().returning(|_| Ok(None));
        cache
            .expect_set()
            .withf(|key, _, ttl| key == "product:8" && *ttl == PRODUCT_CACHE_TTL)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        let read = svc.get_product(8).await.unwrap();

        assert_eq!(read.source, ProductSource::Database);
    }

    #[tokio::test]
    async fn test_get_product_falls_back_when_cache_is_down() {
        let mut repo = MockProductRepository::new();
        repo.expect_get_by_id()
            .returning(|id| Ok(Some(product(id, &[]))));

        let mut cache = MockProductCache::new();
        cache
            .expect_get()
            .returning(|_| Err(ProductError::Cache("connection refused".into())));
        cache
            .expect_set()
            .returning(|_, _, _| Err(ProductError::Cache("connection refused".into())));

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        let read = svc.get_product(8).await.unwrap();
        assert_eq!(read.source, ProductSource::Database);
    }

    #[tokio::test]
    async fn test_get_missing_product() {
        let mut repo = MockProductRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(None));
        let mut cache = MockProductCache::new();
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_set().never();

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        let err = svc.get_product(99).await.unwrap_err();
        assert!(matches!(err, ProductError::NotFound(99)));
    }

    #[tokio::test]
    async fn test_list_requires_user_id() {
        let mut repo = MockProductRepository::new();
        repo.expect_list().never();

        let svc = service(repo, MockProductCache::new(), Arc::new(InMemoryBroker::default()));
        let err = svc.list_products(ProductFilter::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: user_id is required");
    }

    #[tokio::test]
    async fn test_list_returns_summaries() {
        let mut repo = MockProductRepository::new();
        repo.expect_list()
            .withf(|f| f.user_id == Some(1) && f.product_name.as_deref() == Some("lamp"))
            .returning(|_| Ok(vec![product(1, &["a.jpg"]), product(2, &[])]));

        let svc = service(repo, MockProductCache::new(), Arc::new(InMemoryBroker::default()));
        let filter = ProductFilter {
            user_id: Some(1),
            product_name: Some("lamp".into()),
            ..ProductFilter::default()
        };

        let summaries = svc.list_products(filter).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, 1);
    }

    #[tokio::test]
    async fn test_update_invalidates_after_write() {
        let mut repo = MockProductRepository::new();
        repo.expect_update()
            .times(1)
            .returning(|id, _| Ok(Some(product(id, &[]))));

        let mut cache = MockProductCache::new();
        cache
            .expect_delete()
            .withf(|key| key == "product:4")
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        svc.update_product(4, update_input()).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_product_does_not_invalidate() {
        let mut repo = MockProductRepository::new();
        repo.expect_update().returning(|_, _| Ok(None));
        let mut cache = MockProductCache::new();
        cache.expect_delete().never();

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        let err = svc.update_product(4, update_input()).await.unwrap_err();
        assert!(matches!(err, ProductError::NotFound(4)));
    }

    #[tokio::test]
    async fn test_delete_invalidates_even_if_cache_fails() {
        let mut repo = MockProductRepository::new();
        repo.expect_delete().returning(|_| Ok(true));
        let mut cache = MockProductCache::new();
        cache
            .expect_delete()
            .times(1)
            .returning(|_| Err(ProductError::Cache("timeout".into())));

        let svc = service(repo, cache, Arc::new(InMemoryBroker::default()));
        assert!(svc.delete_product(4).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_product() {
        let mut repo = MockProductRepository::new();
        repo.expect_delete().returning(|_| Ok(false));

        let svc = service(repo, MockProductCache::new(), Arc::new(InMemoryBroker::default()));
        let err = svc.delete_product(4).await.unwrap_err();
        assert!(matches!(err, ProductError::NotFound(4)));
    }

    #[tokio::test]
    async fn test_create_user() {
        let mut repo = MockUserRepository::new();
        repo.expect_create().returning(|input| {
            Ok(User {
                user_id: input.user_id,
                user_name: input.user_name,
            })
        });

        let svc = UserService::new(repo);
        let user = svc
            .create_user(CreateUser {
                user_id: 10,
                user_name: "ada".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.user_id, 10);
    }
}
