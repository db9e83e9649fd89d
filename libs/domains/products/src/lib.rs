//! Products Domain
//!
//! Users, products with cache-aside reads, and the image processor that the
//! image worker runs for each product image.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌────────────┐
//! │   Service   │ ──▶ │   Cache    │  ← Redis, invalidated after writes
//! └──────┬──────┘     └────────────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← Data access (trait + PostgreSQL implementation)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Entities, DTOs
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_products::{
//!     handlers, postgres, PgProductRepository, ProductService, RedisProductCache,
//! };
//!
//! let db = postgres::connect(&database_url).await?;
//! let service = ProductService::new(
//!     PgProductRepository::new(db),
//!     RedisProductCache::new(redis),
//!     publisher,
//!     "image_processing",
//! );
//!
//! let app = Router::new().nest("/products", handlers::router(service));
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod image;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheInvalidator, PRODUCT_CACHE_TTL, ProductCache, RedisProductCache, product_cache_key};
pub use error::{ProductError, ProductResult};
pub use image::{ArtifactStore, ImageProcessor, ProductArtifactStore, StoreError, compressed_reference};
pub use models::{
    CreateProduct, CreateUser, Product, ProductFilter, ProductRead, ProductSource, ProductSummary,
    UpdateProduct, User,
};
pub use postgres::{PgProductRepository, PgUserRepository};
pub use repository::{ProductRepository, UserRepository};
pub use service::{ProductService, UserService};
