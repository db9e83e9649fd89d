use serde::{Deserialize, Serialize};
use validator::Validate;

/// Product entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub user_id: i64,
    pub product_name: String,
    pub product_description: String,
    /// Original image references, as uploaded
    pub product_images: Vec<String>,
    /// Compressed variants appended by the image worker
    #[serde(default)]
    pub compressed_product_images: Vec<String>,
    pub product_price: f64,
}

/// DTO for creating a new product
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    pub user_id: i64,

    #[validate(length(min = 1, max = 255))]
    pub product_name: String,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub product_description: String,

    #[serde(default)]
    pub product_images: Vec<String>,

    #[validate(range(min = 0.0))]
    pub product_price: f64,
}

/// DTO for a full product update. Compressed images are owned by the image
/// worker and are not replaced.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProduct {
    pub user_id: i64,

    #[validate(length(min = 1, max = 255))]
    pub product_name: String,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub product_description: String,

    #[serde(default)]
    pub product_images: Vec<String>,

    #[validate(range(min = 0.0))]
    pub product_price: f64,
}

/// Query filters for listing a user's products
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductFilter {
    /// Required; checked by the service so the error names the field
    pub user_id: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Case-insensitive substring match on the product name
    pub product_name: Option<String>,
}

/// Product row as returned by list queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: i64,
    pub product_name: String,
    pub product_description: String,
    pub product_price: f64,
}

impl From<Product> for ProductSummary {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            product_name: product.product_name,
            product_description: product.product_description,
            product_price: product.product_price,
        }
    }
}

/// Where a product read was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSource {
    Cache,
    Database,
}

/// Response body for a single-product read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRead {
    pub data: Product,
    pub source: ProductSource,
}

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub user_name: String,
}

/// DTO for creating a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    pub user_id: i64,

    #[validate(length(min = 1, max = 255))]
    pub user_name: String,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
