use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};

use chrono::Utc;
use log::*;

use crate::{
    traits::{AccountManagement, CatalogManagement, OrderManagement, SettleOrderResult, StoreError},
    vm_types::{
        CorrelationToken,
        DurableOrderId,
        MachineId,
        Money,
        ProductId,
        ReconciledOrder,
        Settlement,
        UserId,
    },
};

#[derive(Debug, Default)]
struct State {
    balances: HashMap<UserId, Money>,
    prices: HashMap<ProductId, Money>,
    stock: HashMap<(MachineId, ProductId), i64>,
    orders: HashMap<CorrelationToken, ReconciledOrder>,
    next_order_id: i64,
}

#[derive(Debug, Default)]
struct Timing {
    latency: Duration,
    settle_ack_delay: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    timing: Mutex<Timing>,
    unavailable: AtomicBool,
}

/// An in-process store with the same atomicity and idempotency guarantees as the SQLite backend.
///
/// Clones share state. The latency, acknowledgement delay and availability switches exist to exercise timeout and
/// failure handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timing(&self) -> std::sync::MutexGuard<'_, Timing> {
        self.inner.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_user(&self, user_id: UserId, balance: Money) {
        self.state().balances.insert(user_id, balance);
    }

    pub fn add_product(&self, product_id: ProductId, price: Money) {
        self.state().prices.insert(product_id, price);
    }

    pub fn set_stock(&self, machine_id: MachineId, product_id: ProductId, quantity: i64) {
        self.state().stock.insert((machine_id, product_id), quantity);
    }

    pub fn balance(&self, user_id: UserId) -> Option<Money> {
        self.state().balances.get(&user_id).copied()
    }

    pub fn stock(&self, machine_id: MachineId, product_id: ProductId) -> Option<i64> {
        self.state().stock.get(&(machine_id, product_id)).copied()
    }

    pub fn order_count(&self) -> usize {
        self.state().orders.len()
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Duration) {
        self.timing().latency = latency;
    }

    /// Delay applied *after* a settlement has been committed, before the call returns.
    pub fn set_settle_ack_delay(&self, delay: Duration) {
        self.timing().settle_ack_delay = delay;
    }

    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = self.timing().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("the in-memory store is switched off".into()));
        }
        Ok(())
    }

    fn apply(&self, settlement: Settlement) -> Result<SettleOrderResult, StoreError> {
        let mut state = self.state();
        if let Some(order) = state.orders.get(&settlement.token) {
            return Ok(SettleOrderResult::AlreadyExists(order.clone()));
        }
        let available =
            state.balances.get(&settlement.user_id).copied().ok_or(StoreError::UnknownAccount(settlement.user_id))?;
        if settlement.total > available {
            return Err(StoreError::InsufficientBalance { required: settlement.total, available });
        }
        for line in &settlement.lines {
            let stock = state
                .stock
                .get(&(settlement.machine_id, line.product_id))
                .copied()
                .ok_or(StoreError::UnknownProduct(line.product_id))?;
            if line.quantity > stock {
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: stock,
                });
            }
        }
        // Every check has passed, so nothing below can fail
        for line in &settlement.lines {
            if let Some(stock) = state.stock.get_mut(&(settlement.machine_id, line.product_id)) {
                *stock -= line.quantity;
            }
        }
        if let Some(balance) = state.balances.get_mut(&settlement.user_id) {
            *balance -= settlement.total;
        }
        state.next_order_id += 1;
        let order = ReconciledOrder {
            order_id: DurableOrderId(state.next_order_id),
            token: settlement.token.clone(),
            user_id: settlement.user_id,
            machine_id: settlement.machine_id,
            lines: settlement.lines,
            total: settlement.total,
            settled_at: Utc::now(),
        };
        state.orders.insert(settlement.token, order.clone());
        debug!("🗃️ [memory] Order #{} stored for {}", order.order_id, order.token);
        Ok(SettleOrderResult::Inserted(order))
    }
}

impl AccountManagement for MemoryStore {
    async fn fetch_balance(&self, user_id: UserId) -> Result<Option<Money>, StoreError> {
        self.enter().await?;
        Ok(self.balance(user_id))
    }
}

impl CatalogManagement for MemoryStore {
    async fn fetch_catalog_price(&self, product_id: ProductId) -> Result<Option<Money>, StoreError> {
        self.enter().await?;
        Ok(self.state().prices.get(&product_id).copied())
    }

    async fn fetch_stock(&self, machine_id: MachineId, product_id: ProductId) -> Result<Option<i64>, StoreError> {
        self.enter().await?;
        Ok(self.stock(machine_id, product_id))
    }
}

impl OrderManagement for MemoryStore {
    async fn settle_order(&self, settlement: Settlement) -> Result<SettleOrderResult, StoreError> {
        self.enter().await?;
        let result = self.apply(settlement)?;
        let delay = self.timing().settle_ack_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(result)
    }

    async fn fetch_order_by_token(&self, token: &CorrelationToken) -> Result<Option<ReconciledOrder>, StoreError> {
        self.enter().await?;
        Ok(self.state().orders.get(token).cloned())
    }
}
