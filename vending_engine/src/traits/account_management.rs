use crate::{
    traits::StoreError,
    vm_types::{Money, UserId},
};

/// Read access to user accounts.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the current balance for the user. If the user does not exist, `None` is returned.
    async fn fetch_balance(&self, user_id: UserId) -> Result<Option<Money>, StoreError>;
}
