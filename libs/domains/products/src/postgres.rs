use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder,
};
use std::time::Duration;
use tracing::info;

use crate::entity::{product, user};
use crate::error::{ProductResult, user_insert_error};
use crate::models::{CreateProduct, CreateUser, Product, ProductFilter, UpdateProduct, User};
use crate::repository::{ProductRepository, UserRepository};

/// Connect to PostgreSQL with pool settings shared by the API and the worker
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    info!("Successfully connected to PostgreSQL database");
    Ok(db)
}

#[derive(Clone)]
pub struct PgProductRepository {
    db: DatabaseConnection,
}

impl PgProductRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create(&self, input: CreateProduct) -> ProductResult<Product> {
        let active_model: product::ActiveModel = input.into();
        let model = active_model.insert(&self.db).await?;

        tracing::info!(product_id = model.id, "Created product");
        Ok(model.into())
    }

    async fn get_by_id(&self, id: i64) -> ProductResult<Option<Product>> {
        let model = product::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list(&self, filter: ProductFilter) -> ProductResult<Vec<Product>> {
        let mut query = product::Entity::find();

        if let Some(user_id) = filter.user_id {
            query = query.filter(product::Column::UserId.eq(user_id));
        }

        if let Some(min_price) = filter.min_price {
            query = query.filter(product::Column::ProductPrice.gte(min_price));
        }

        if let Some(max_price) = filter.max_price {
            query = query.filter(product::Column::ProductPrice.lte(max_price));
        }

        if let Some(name) = filter.product_name.filter(|n| !n.is_empty()) {
            query = query.filter(Expr::cust_with_values(
                "product_name ILIKE $1",
                [format!("%{}%", name)],
            ));
        }

        let models = query
            .order_by_asc(product::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update(&self, id: i64, input: UpdateProduct) -> ProductResult<Option<Product>> {
        let Some(existing) = product::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active_model: product::ActiveModel = existing.into();
        active_model.user_id = Set(input.user_id);
        active_model.product_name = Set(input.product_name);
        active_model.product_description = Set(input.product_description);
        active_model.product_images = Set(input.product_images);
        active_model.product_price = Set(input.product_price);

        let model = active_model.update(&self.db).await?;
        tracing::info!(product_id = id, "Updated product");
        Ok(Some(model.into()))
    }

    async fn delete(&self, id: i64) -> ProductResult<bool> {
        let result = product::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn append_compressed_image(&self, id: i64, image: &str) -> ProductResult<bool> {
        // Single statement: the duplicate check and the append are atomic per row
        let result = product::Entity::update_many()
            .col_expr(
                product::Column::CompressedProductImages,
                Expr::cust_with_values(
                    "array_append(compressed_product_images, $1)",
                    [image.to_string()],
                ),
            )
            .filter(product::Column::Id.eq(id))
            .filter(Expr::cust_with_values(
                "NOT ($1 = ANY(compressed_product_images))",
                [image.to_string()],
            ))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: DatabaseConnection,
}

impl PgUserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, input: CreateUser) -> ProductResult<User> {
        let user = User {
            user_id: input.user_id,
            user_name: input.user_name.clone(),
        };
        let active_model: user::ActiveModel = input.into();

        // users has a natural key, so skip the RETURNING round trip
        user::Entity::insert(active_model)
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| user_insert_error(user.user_id, e))?;

        tracing::info!(user_id = user.user_id, "Created user");
        Ok(user)
    }
}
