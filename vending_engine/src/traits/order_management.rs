use crate::{
    traits::{SettleOrderResult, StoreError},
    vm_types::{CorrelationToken, ReconciledOrder, Settlement},
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Settles an order in a single atomic step: the stock of every line is decremented, the user is debited with the
    /// total, and the order and its lines are stored against the settlement's correlation token.
    ///
    /// Implementations MUST re-check stock and balance inside the atomic step, and return
    /// [`StoreError::InsufficientStock`] or [`StoreError::InsufficientBalance`] without applying anything if either
    /// check fails.
    ///
    /// The call is idempotent on the token. If an order already exists for the token, nothing is applied and the
    /// existing order is returned as [`SettleOrderResult::AlreadyExists`].
    async fn settle_order(&self, settlement: Settlement) -> Result<SettleOrderResult, StoreError>;

    /// Fetches the order settled under the given token, if there is one.
    async fn fetch_order_by_token(&self, token: &CorrelationToken) -> Result<Option<ReconciledOrder>, StoreError>;
}
