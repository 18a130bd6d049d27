//! # Collaborator contracts
//!
//! The pipeline never talks to the relational store or to the broker directly. Instead, backends implement the
//! traits in this module and are handed to the pipeline at construction time.
//!
//! * [`AccountManagement`] exposes user balances.
//! * [`CatalogManagement`] exposes authoritative prices and per-machine stock levels.
//! * [`OrderManagement`] settles orders atomically and looks them up by correlation token.
//! * [`VendingBackend`] is the union of the three and is what the reconciliation engine is generic over.
//! * [`MessagePublisher`] is the outbound half of the broker.
mod account_management;
mod catalog_management;
mod data_objects;
mod message_publisher;
mod order_management;
mod vending_backend;

pub use account_management::AccountManagement;
pub use catalog_management::CatalogManagement;
pub use data_objects::{PublishError, SettleOrderResult, StoreError};
pub use message_publisher::MessagePublisher;
pub use order_management::OrderManagement;
pub use vending_backend::VendingBackend;
