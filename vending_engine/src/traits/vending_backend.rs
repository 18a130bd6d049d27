use crate::traits::{AccountManagement, CatalogManagement, OrderManagement};

/// Everything the reconciliation engine needs from the store.
pub trait VendingBackend: AccountManagement + CatalogManagement + OrderManagement {}

impl<T> VendingBackend for T where T: AccountManagement + CatalogManagement + OrderManagement {}
