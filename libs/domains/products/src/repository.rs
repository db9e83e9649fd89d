use async_trait::async_trait;

use crate::error::ProductResult;
use crate::models::{CreateProduct, CreateUser, Product, ProductFilter, UpdateProduct, User};

/// Repository trait for Product persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Create a new product
    async fn create(&self, input: CreateProduct) -> ProductResult<Product>;

    /// Get a product by ID
    async fn get_by_id(&self, id: i64) -> ProductResult<Option<Product>>;

    /// List products matching a filter, ordered by id
    async fn list(&self, filter: ProductFilter) -> ProductResult<Vec<Product>>;

    /// Replace a product's fields. Returns `None` if it does not exist.
    async fn update(&self, id: i64, input: UpdateProduct) -> ProductResult<Option<Product>>;

    /// Delete a product by ID. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> ProductResult<bool>;

    /// Append a compressed image reference unless it is already present.
    ///
    /// Returns whether the collection changed. Safe to repeat and to run
    /// concurrently for the same product.
    async fn append_compressed_image(&self, id: i64, image: &str) -> ProductResult<bool>;
}

/// Repository trait for User persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: CreateUser) -> ProductResult<User>;
}
