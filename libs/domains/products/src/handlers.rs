//! HTTP handlers for the catalog API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;

use crate::cache::ProductCache;
use crate::error::ProductResult;
use crate::models::{
    CreateProduct, CreateUser, MessageResponse, Product, ProductFilter, ProductRead,
    ProductSummary, UpdateProduct,
};
use crate::repository::{ProductRepository, UserRepository};
use crate::service::{ProductService, UserService};

/// Product endpoints, to be nested under `/products`
pub fn router<R, C>(service: ProductService<R, C>) -> Router
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    let shared_service = Arc::new(service);

    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .with_state(shared_service)
}

/// User endpoints, to be nested under `/users`
pub fn users_router<U>(service: UserService<U>) -> Router
where
    U: UserRepository + 'static,
{
    Router::new()
        .route("/", post(create_user))
        .with_state(Arc::new(service))
}

/// List a user's products with optional price and name filters
async fn list_products<R: ProductRepository, C: ProductCache>(
    State(service): State<Arc<ProductService<R, C>>>,
    Query(filter): Query<ProductFilter>,
) -> ProductResult<Json<Vec<ProductSummary>>> {
    let products = service.list_products(filter).await?;
    Ok(Json(products))
}

/// Create a product and enqueue its images
async fn create_product<R: ProductRepository, C: ProductCache>(
    State(service): State<Arc<ProductService<R, C>>>,
    Json(input): Json<CreateProduct>,
) -> ProductResult<impl IntoResponse> {
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Get a product by ID, served from cache when possible
async fn get_product<R: ProductRepository, C: ProductCache>(
    State(service): State<Arc<ProductService<R, C>>>,
    Path(id): Path<i64>,
) -> ProductResult<Json<ProductRead>> {
    let read = service.get_product(id).await?;
    Ok(Json(read))
}

/// Replace a product
async fn update_product<R: ProductRepository, C: ProductCache>(
    State(service): State<Arc<ProductService<R, C>>>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProduct>,
) -> ProductResult<Json<Product>> {
    let product = service.update_product(id, input).await?;
    Ok(Json(product))
}

/// Delete a product
async fn delete_product<R: ProductRepository, C: ProductCache>(
    State(service): State<Arc<ProductService<R, C>>>,
    Path(id): Path<i64>,
) -> ProductResult<Json<MessageResponse>> {
    service.delete_product(id).await?;
    Ok(Json(MessageResponse::new("Product deleted successfully")))
}

/// Create a user
async fn create_user<U: UserRepository>(
    State(service): State<Arc<UserService<U>>>,
    Json(input): Json<CreateUser>,
) -> ProductResult<impl IntoResponse> {
    service.create_user(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}
