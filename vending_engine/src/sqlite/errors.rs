use thiserror::Error;

use crate::{
    traits::StoreError,
    vm_types::{Money, ProductId, UserId},
};

#[derive(Debug, Error)]
pub enum SqliteStoreError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("User account {0} does not exist")]
    UnknownAccount(UserId),
    #[error("Product {0} is not stocked in this machine")]
    UnknownProduct(ProductId),
    #[error("Insufficient stock of product {product_id}. Requested {requested}, available {available}")]
    InsufficientStock { product_id: ProductId, requested: i64, available: i64 },
    #[error("Insufficient balance. Required {required}, available {available}")]
    InsufficientBalance { required: Money, available: Money },
}

impl From<SqliteStoreError> for StoreError {
    fn from(e: SqliteStoreError) -> Self {
        match e {
            SqliteStoreError::DriverError(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    StoreError::Unavailable(e.to_string())
                },
                e => StoreError::QueryError(e.to_string()),
            },
            SqliteStoreError::MigrationError(e) => StoreError::Unavailable(e.to_string()),
            SqliteStoreError::QueryError(s) => StoreError::QueryError(s),
            SqliteStoreError::UnknownAccount(id) => StoreError::UnknownAccount(id),
            SqliteStoreError::UnknownProduct(id) => StoreError::UnknownProduct(id),
            SqliteStoreError::InsufficientStock { product_id, requested, available } => {
                StoreError::InsufficientStock { product_id, requested, available }
            },
            SqliteStoreError::InsufficientBalance { required, available } => {
                StoreError::InsufficientBalance { required, available }
            },
        }
    }
}
