use std::{fmt::Debug, sync::Arc};

use chrono::{SubsecRound, Utc};
use log::*;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::{accounts, catalog, new_pool, orders, SqliteStoreError};
use crate::{
    traits::{AccountManagement, CatalogManagement, OrderManagement, SettleOrderResult, StoreError},
    vm_types::{CorrelationToken, MachineCode, MachineId, Money, ProductId, ReconciledOrder, Settlement, UserId},
};

/// Clones share the connection pool and the settlement lock.
///
/// Only one settlement transaction runs at a time. A deferred SQLite transaction that reads and then writes fails with
/// `SQLITE_BUSY` instead of waiting if another connection is writing. Reads don't take the lock.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    settlements: Arc<Mutex<()>>,
}

impl Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteStore ({:?})", self.pool)
    }
}

impl SqliteStore {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteStoreError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { pool, settlements: Arc::new(Mutex::new(())) })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SqliteStoreError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_user(&self, username: &str, balance: Money) -> Result<UserId, SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        accounts::create_user(username, balance, &mut conn).await
    }

    pub async fn set_balance(&self, user_id: UserId, balance: Money) -> Result<(), SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        accounts::set_balance(user_id, balance, &mut conn).await
    }

    pub async fn create_product(&self, name: &str, price: Money) -> Result<ProductId, SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        catalog::create_product(name, price, &mut conn).await
    }

    pub async fn create_machine(&self, code: &MachineCode, location: Option<&str>) -> Result<MachineId, SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        catalog::create_machine(code, location, &mut conn).await
    }

    pub async fn fetch_machine_id(&self, code: &MachineCode) -> Result<Option<MachineId>, SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        catalog::fetch_machine_id(code, &mut conn).await
    }

    pub async fn delete_machine(&self, code: &MachineCode) -> Result<bool, SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        catalog::delete_machine(code, &mut conn).await
    }

    pub async fn set_stock(&self, machine_id: MachineId, product_id: ProductId, stock: i64) -> Result<(), SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        catalog::set_stock(machine_id, product_id, stock, &mut conn).await
    }

    pub async fn count_orders(&self) -> Result<i64, SqliteStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::count_orders(&mut conn).await
    }

    /// Takes a settlement, and in a single atomic transaction,
    /// * returns the existing order if one has already been stored for the token. Nothing else is done.
    /// * checks the user's balance and the machine's stock of every line,
    /// * decrements the stock and debits the user,
    /// * stores the order and its lines.
    async fn settle(&self, settlement: Settlement) -> Result<SettleOrderResult, SqliteStoreError> {
        let _writer = self.settlements.lock().await;
        let mut tx = self.pool.begin().await?;
        if let Some(order) = orders::fetch_order_by_token(&settlement.token, &mut tx).await? {
            debug!("🗃️ {} was already settled as order #{}", settlement.token, order.order_id);
            return Ok(SettleOrderResult::AlreadyExists(order));
        }
        let user_id = settlement.user_id;
        let available =
            accounts::fetch_balance(user_id, &mut tx).await?.ok_or(SqliteStoreError::UnknownAccount(user_id))?;
        if settlement.total > available {
            return Err(SqliteStoreError::InsufficientBalance { required: settlement.total, available });
        }
        for line in &settlement.lines {
            catalog::decrement_stock(settlement.machine_id, line.product_id, line.quantity, &mut tx).await?;
        }
        accounts::debit(user_id, settlement.total, &mut tx).await?;
        orders::insert_order(&settlement, Utc::now().trunc_subsecs(3), &mut tx).await?;
        let order = orders::fetch_order_by_token(&settlement.token, &mut tx)
            .await?
            .ok_or_else(|| SqliteStoreError::QueryError(format!("Order for {} vanished after insert", settlement.token)))?;
        tx.commit().await?;
        debug!("🗃️ {} settled as order #{}. User {user_id} debited {}", order.token, order.order_id, order.total);
        Ok(SettleOrderResult::Inserted(order))
    }
}

impl AccountManagement for SqliteStore {
    async fn fetch_balance(&self, user_id: UserId) -> Result<Option<Money>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteStoreError::from)?;
        Ok(accounts::fetch_balance(user_id, &mut conn).await?)
    }
}

impl CatalogManagement for SqliteStore {
    async fn fetch_catalog_price(&self, product_id: ProductId) -> Result<Option<Money>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteStoreError::from)?;
        Ok(catalog::fetch_price(product_id, &mut conn).await?)
    }

    async fn fetch_stock(&self, machine_id: MachineId, product_id: ProductId) -> Result<Option<i64>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteStoreError::from)?;
        Ok(catalog::fetch_stock(machine_id, product_id, &mut conn).await?)
    }
}

impl OrderManagement for SqliteStore {
    async fn settle_order(&self, settlement: Settlement) -> Result<SettleOrderResult, StoreError> {
        let token = settlement.token.clone();
        match self.settle(settlement).await {
            Err(SqliteStoreError::DriverError(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                // A concurrent settlement of the same token won the race
                debug!("🗃️ {token} was settled concurrently. Fetching the stored order");
                let order = self.fetch_order_by_token(&token).await?.ok_or_else(|| {
                    StoreError::QueryError(format!("Duplicate order for {token} could not be fetched"))
                })?;
                Ok(SettleOrderResult::AlreadyExists(order))
            },
            Err(e) => {
                warn!("🗃️ Could not settle {token}. {e}");
                Err(e.into())
            },
            Ok(result) => Ok(result),
        }
    }

    async fn fetch_order_by_token(&self, token: &CorrelationToken) -> Result<Option<ReconciledOrder>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteStoreError::from)?;
        Ok(orders::fetch_order_by_token(token, &mut conn).await?)
    }
}
