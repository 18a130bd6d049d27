use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    traits::{PublishError, StoreError},
    vm_types::{Money, ProductId, UserId},
};

/// Why an order intent did not produce an order.
///
/// Most reasons are terminal: the result is cached against the token and the client must retry with a new token.
/// [`RejectReason::SettlementTimeout`] and [`RejectReason::CollaboratorUnavailable`] are not cached, since the order
/// may still be settled by a later attempt with the same token.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("The order has no lines")]
    EmptyOrder,
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },
    #[error("User account {user_id} does not exist")]
    UnknownAccount { user_id: UserId },
    #[error("Product {product_id} is not available in this machine")]
    UnknownProduct { product_id: ProductId },
    #[error("Insufficient stock of product {product_id}. Requested {requested}, available {available}")]
    InsufficientStock { product_id: ProductId, requested: i64, available: i64 },
    #[error("Insufficient balance. Required {required}, available {available}")]
    InsufficientBalance { required: Money, available: Money },
    #[error("Settlement did not complete in time")]
    SettlementTimeout,
    #[error("A collaborator is unavailable. {message}")]
    CollaboratorUnavailable { message: String },
}

impl RejectReason {
    /// Terminal reasons are cached against the token. Non-terminal ones leave the token eligible for another attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RejectReason::SettlementTimeout | RejectReason::CollaboratorUnavailable { .. })
    }

    /// A short, stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::EmptyOrder => "empty_order",
            RejectReason::InvalidQuantity { .. } => "invalid_quantity",
            RejectReason::UnknownAccount { .. } => "unknown_account",
            RejectReason::UnknownProduct { .. } => "unknown_product",
            RejectReason::InsufficientStock { .. } => "insufficient_stock",
            RejectReason::InsufficientBalance { .. } => "insufficient_balance",
            RejectReason::SettlementTimeout => "settlement_timeout",
            RejectReason::CollaboratorUnavailable { .. } => "collaborator_unavailable",
        }
    }
}

impl From<StoreError> for RejectReason {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientStock { product_id, requested, available } => {
                RejectReason::InsufficientStock { product_id, requested, available }
            },
            StoreError::InsufficientBalance { required, available } => {
                RejectReason::InsufficientBalance { required, available }
            },
            StoreError::UnknownAccount(user_id) => RejectReason::UnknownAccount { user_id },
            StoreError::UnknownProduct(product_id) => RejectReason::UnknownProduct { product_id },
            StoreError::Unavailable(message) | StoreError::QueryError(message) => {
                RejectReason::CollaboratorUnavailable { message }
            },
        }
    }
}

/// Failures while turning a raw broker message into pipeline state. These are logged and dropped; they never stop
/// ingestion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Malformed message on {topic}. {reason}")]
    MalformedMessage { topic: String, reason: String },
    #[error("No route for topic {0}")]
    UnknownTopic(String),
}

impl IngestError {
    pub fn malformed<T: Into<String>, R: ToString>(topic: T, reason: R) -> Self {
        Self::MalformedMessage { topic: topic.into(), reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("Invalid machine code. {0}")]
    InvalidMachineCode(String),
    #[error("Unknown command {0}")]
    UnknownCommand(String),
    #[error("Invalid value for {command}. {reason}")]
    InvalidValue { command: String, reason: String },
    #[error("Temperature {value} is outside the safe range [{min}, {max}]")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },
    #[error("Could not publish the command. {0}")]
    PublishFailed(#[from] PublishError),
}

impl CommandError {
    /// True if the command was rejected before anything was sent.
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, CommandError::PublishFailed(_))
    }
}
