use crate::{
    traits::StoreError,
    vm_types::{MachineId, Money, ProductId},
};

/// Read access to the product catalog and machine inventory. Values returned here are authoritative at the time of
/// the call, but may change before settlement. [`OrderManagement::settle_order`](crate::traits::OrderManagement)
/// re-checks them atomically.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    async fn fetch_catalog_price(&self, product_id: ProductId) -> Result<Option<Money>, StoreError>;

    /// Fetches the stock level of a product in a machine. Returns `None` if the machine does not stock the product.
    async fn fetch_stock(&self, machine_id: MachineId, product_id: ProductId) -> Result<Option<i64>, StoreError>;
}
