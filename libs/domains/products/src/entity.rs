//! Sea-ORM entities for the `products` and `users` tables

pub mod product {
    use sea_orm::entity::prelude::*;
    use sea_orm::ActiveValue::{NotSet, Set};
    use serde::{Deserialize, Serialize};

    use crate::models::{CreateProduct, Product};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "products")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub user_id: i64,
        #[sea_orm(column_type = "Text")]
        pub product_name: String,
        #[sea_orm(column_type = "Text")]
        pub product_description: String,
        pub product_images: Vec<String>,
        pub compressed_product_images: Vec<String>,
        #[sea_orm(column_type = "Double")]
        pub product_price: f64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl From<Model> for Product {
        fn from(model: Model) -> Self {
            Self {
                id: model.id,
                user_id: model.user_id,
                product_name: model.product_name,
                product_description: model.product_description,
                product_images: model.product_images,
                compressed_product_images: model.compressed_product_images,
                product_price: model.product_price,
            }
        }
    }

    impl From<CreateProduct> for ActiveModel {
        fn from(input: CreateProduct) -> Self {
            ActiveModel {
                id: NotSet,
                user_id: Set(input.user_id),
                product_name: Set(input.product_name),
                product_description: Set(input.product_description),
                product_images: Set(input.product_images),
                compressed_product_images: Set(Vec::new()),
                product_price: Set(input.product_price),
            }
        }
    }
}

pub mod user {
    use sea_orm::entity::prelude::*;
    use sea_orm::ActiveValue::Set;
    use serde::{Deserialize, Serialize};

    use crate::models::{CreateUser, User};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: i64,
        #[sea_orm(column_type = "Text")]
        pub user_name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    impl From<Model> for User {
        fn from(model: Model) -> Self {
            Self {
                user_id: model.user_id,
                user_name: model.user_name,
            }
        }
    }

    impl From<CreateUser> for ActiveModel {
        fn from(input: CreateUser) -> Self {
            ActiveModel {
                user_id: Set(input.user_id),
                user_name: Set(input.user_name),
            }
        }
    }
}
