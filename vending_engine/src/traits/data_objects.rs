use thiserror::Error;

use crate::vm_types::{Money, ProductId, ReconciledOrder, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOrderResult {
    Inserted(ReconciledOrder),
    AlreadyExists(ReconciledOrder),
}

impl SettleOrderResult {
    pub fn into_order(self) -> ReconciledOrder {
        match self {
            SettleOrderResult::Inserted(o) => o,
            SettleOrderResult::AlreadyExists(o) => o,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("The store is unavailable. {0}")]
    Unavailable(String),
    #[error("Insufficient stock of product {product_id}. Requested {requested}, but only {available} available")]
    InsufficientStock { product_id: ProductId, requested: i64, available: i64 },
    #[error("Insufficient balance. The order requires {required}, but the balance is {available}")]
    InsufficientBalance { required: Money, available: Money },
    #[error("User account {0} does not exist")]
    UnknownAccount(UserId),
    #[error("Product {0} is not stocked in this machine")]
    UnknownProduct(ProductId),
    #[error("Store query failed. {0}")]
    QueryError(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("The broker connection is not available. {0}")]
    NotConnected(String),
    #[error("Could not serialize the message payload. {0}")]
    Serialization(String),
    #[error("The broker rejected the message. {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for PublishError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
