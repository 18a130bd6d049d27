use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use log::*;
use tokio::{
    sync::watch,
    time::{timeout, timeout_at, Instant},
};

use crate::{
    events::{EventProducers, OrderReconciledEvent, OrderRejectedEvent},
    pipeline::{payloads::OrderOutcome, topics::Topics, RejectReason},
    traits::{MessagePublisher, VendingBackend},
    vm_types::{CorrelationToken, MachineId, Money, OrderIntent, OrderLine, PricedLine, ReconciledOrder, Settlement},
};

pub type Resolution = Result<ReconciledOrder, RejectReason>;

enum Slot {
    Pending(watch::Receiver<Option<Resolution>>),
    Resolved { result: Resolution, resolved_at: DateTime<Utc> },
}

enum Claim {
    Cached(Resolution),
    Wait(watch::Receiver<Option<Resolution>>),
    Lead(watch::Sender<Option<Resolution>>),
}

/// Where a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    /// Computed by this call.
    Fresh,
    /// Found in the store's order history, e.g. after a restart.
    Recovered,
}

/// What the engine currently knows about a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Unknown,
    Pending,
    Resolved(OrderOutcome),
}

/// Removes a pending slot if its leader goes away without resolving it, so that waiters can take over.
struct PendingGuard<'a> {
    slots: &'a Mutex<HashMap<CorrelationToken, Slot>>,
    token: &'a CorrelationToken,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(Slot::Pending(_)) = slots.get(self.token) {
                warn!("🔄️ Resolution of {} was abandoned before completing", self.token);
                slots.remove(self.token);
            }
        }
    }
}

/// `Reconciler` turns order intents into durable orders.
///
/// Every intent is priced, stock-checked and balance-checked against the backend at resolution time, and then settled
/// atomically by the backend. The client-declared total is never used. Outcomes are published on the intent's outcome
/// topic and announced to the event hooks.
///
/// Resolutions are cached per correlation token, so duplicate deliveries of an intent are answered from the cache.
/// Concurrent duplicates wait for the attempt already in flight. Non-terminal rejections are not cached.
pub struct Reconciler<B, P> {
    db: B,
    publisher: Arc<P>,
    producers: EventProducers,
    topics: Topics,
    settlement_timeout: Duration,
    retention: Duration,
    slots: Mutex<HashMap<CorrelationToken, Slot>>,
}

impl<B, P> Debug for Reconciler<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reconciler")
    }
}

impl<B, P> Reconciler<B, P> {
    pub fn new(
        db: B,
        publisher: Arc<P>,
        producers: EventProducers,
        topics: Topics,
        settlement_timeout: Duration,
        retention: Duration,
    ) -> Self {
        Self { db, publisher, producers, topics, settlement_timeout, retention, slots: Mutex::new(HashMap::new()) }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn status(&self, token: &CorrelationToken) -> TokenStatus {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(token) {
            None => TokenStatus::Unknown,
            Some(Slot::Pending(_)) => TokenStatus::Pending,
            Some(Slot::Resolved { result, .. }) => TokenStatus::Resolved(OrderOutcome::new(token.clone(), result)),
        }
    }

    /// Drops cached resolutions older than the retention window. Returns the number of tokens removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Pending(_) => true,
            Slot::Resolved { resolved_at, .. } => {
                (now - *resolved_at).to_std().map(|age| age < self.retention).unwrap_or(true)
            },
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!("🔄️ Evicted {removed} expired tokens from the idempotency map");
        }
        removed
    }

    /// The number of tokens currently tracked, pending or resolved.
    pub fn tracked_tokens(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn claim(&self, token: &CorrelationToken) -> Claim {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(token) {
            Some(Slot::Resolved { result, .. }) => Claim::Cached(result.clone()),
            Some(Slot::Pending(rx)) => Claim::Wait(rx.clone()),
            None => {
                let (tx, rx) = watch::channel(None);
                slots.insert(token.clone(), Slot::Pending(rx));
                Claim::Lead(tx)
            },
        }
    }

    fn record(&self, token: &CorrelationToken, result: &Resolution) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Err(reason) if !reason.is_terminal() => {
                slots.remove(token);
            },
            _ => {
                slots.insert(token.clone(), Slot::Resolved { result: result.clone(), resolved_at: Utc::now() });
            },
        }
    }
}

impl<B, P> Reconciler<B, P>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    /// Resolves an order intent.
    ///
    /// A token that has already been resolved returns the cached result without touching the store, and its outcome is
    /// re-published for the benefit of a client that may have missed it.
    pub async fn reconcile(&self, intent: OrderIntent) -> Resolution {
        let token = intent.token.clone();
        let sender = loop {
            match self.claim(&token) {
                Claim::Cached(result) => {
                    debug!("🔄️ Intent {token} has already been resolved. Returning the cached outcome");
                    self.publish_outcome(&token, &result).await;
                    return result;
                },
                Claim::Wait(rx) => {
                    debug!("🔄️ Intent {token} is already being resolved. Waiting for the result");
                    if let Some(result) = wait_for_resolution(rx).await {
                        return result;
                    }
                },
                Claim::Lead(tx) => break tx,
            }
        };
        let mut guard = PendingGuard { slots: &self.slots, token: &token, armed: true };
        let (result, provenance) = self.resolve(&intent).await;
        self.record(&token, &result);
        guard.armed = false;
        // Waiters may have given up; that is fine
        let _ = sender.send(Some(result.clone()));
        match &result {
            Ok(order) => info!(
                "🔄️ Intent {token} reconciled as order #{} for user {} with a total of {}",
                order.order_id, order.user_id, order.total
            ),
            Err(reason) => info!("🔄️ Intent {token} rejected. {reason}"),
        }
        self.publish_outcome(&token, &result).await;
        if provenance == Provenance::Fresh {
            self.call_outcome_hooks(&token, &result).await;
        }
        result
    }

    /// The history lookup and the settlement share a single deadline, `settlement_timeout` from now.
    async fn resolve(&self, intent: &OrderIntent) -> (Resolution, Provenance) {
        let token = &intent.token;
        let deadline = Instant::now() + self.settlement_timeout;
        match timeout_at(deadline, self.db.fetch_order_by_token(token)).await {
            Ok(Ok(Some(order))) => {
                debug!("🔄️ Intent {token} was already settled as order #{}", order.order_id);
                return (Ok(order), Provenance::Recovered);
            },
            Ok(Ok(None)) => {},
            Ok(Err(e)) => {
                warn!("🔄️ Could not check the order history for {token}. {e}");
                return (Err(e.into()), Provenance::Fresh);
            },
            Err(_) => {
                warn!("🔄️ Timed out checking the order history for {token}");
                return (Err(RejectReason::SettlementTimeout), Provenance::Fresh);
            },
        }
        match timeout_at(deadline, self.settle(intent)).await {
            Ok(result) => (result, Provenance::Fresh),
            Err(_) => (self.verify_after_timeout(token).await, Provenance::Fresh),
        }
    }

    /// After a timeout, we don't know whether the store applied the settlement. Ask it before giving up.
    ///
    /// The check gets a fresh `settlement_timeout` of its own, so an intent is resolved within twice the timeout.
    async fn verify_after_timeout(&self, token: &CorrelationToken) -> Resolution {
        warn!("🔄️ Settlement of {token} timed out after {:?}. Checking the store for the order", self.settlement_timeout);
        match timeout(self.settlement_timeout, self.db.fetch_order_by_token(token)).await {
            Ok(Ok(Some(order))) => {
                info!("🔄️ Intent {token} was settled as order #{} despite the timeout", order.order_id);
                Ok(order)
            },
            Ok(Ok(None)) => Err(RejectReason::SettlementTimeout),
            Ok(Err(e)) => {
                warn!("🔄️ Could not verify the settlement of {token}. {e}");
                Err(RejectReason::SettlementTimeout)
            },
            Err(_) => Err(RejectReason::SettlementTimeout),
        }
    }

    async fn settle(&self, intent: &OrderIntent) -> Resolution {
        let lines = validate_lines(intent)?;
        let balance = self
            .db
            .fetch_balance(intent.user_id)
            .await?
            .ok_or(RejectReason::UnknownAccount { user_id: intent.user_id })?;
        let priced = try_join_all(lines.iter().map(|line| self.price_line(intent.machine_id, line))).await?;
        let total = order_total(&priced)?;
        trace!("🔄️ Intent {} prices at {total} against a balance of {balance}", intent.token);
        if total > balance {
            return Err(RejectReason::InsufficientBalance { required: total, available: balance });
        }
        let settlement = Settlement {
            token: intent.token.clone(),
            user_id: intent.user_id,
            machine_id: intent.machine_id,
            lines: priced,
            total,
        };
        let order = self.db.settle_order(settlement).await?.into_order();
        Ok(order)
    }

    async fn price_line(&self, machine_id: MachineId, line: &OrderLine) -> Result<PricedLine, RejectReason> {
        let product_id = line.product_id;
        let unit_price =
            self.db.fetch_catalog_price(product_id).await?.ok_or(RejectReason::UnknownProduct { product_id })?;
        let available =
            self.db.fetch_stock(machine_id, product_id).await?.ok_or(RejectReason::UnknownProduct { product_id })?;
        if line.quantity > available {
            return Err(RejectReason::InsufficientStock { product_id, requested: line.quantity, available });
        }
        Ok(PricedLine { product_id, quantity: line.quantity, unit_price })
    }

    async fn publish_outcome(&self, token: &CorrelationToken, result: &Resolution) {
        let outcome = OrderOutcome::new(token.clone(), result);
        let payload = match serde_json::to_vec(&outcome) {
            Ok(p) => p,
            Err(e) => {
                error!("🔄️ Could not serialize the outcome for {token}. {e}");
                return;
            },
        };
        let topic = self.topics.outcome(token);
        if let Err(e) = self.publisher.publish(&topic, &payload).await {
            error!("🔄️ Could not publish the outcome for {token} to {topic}. {e}");
        }
    }

    async fn call_outcome_hooks(&self, token: &CorrelationToken, result: &Resolution) {
        match result {
            Ok(order) => {
                for emitter in &self.producers.order_reconciled_producer {
                    debug!("🔄️ Notifying order reconciled hook subscribers");
                    emitter.publish_event(OrderReconciledEvent::new(order.clone())).await;
                }
            },
            Err(reason) => {
                for emitter in &self.producers.order_rejected_producer {
                    debug!("🔄️ Notifying order rejected hook subscribers");
                    emitter.publish_event(OrderRejectedEvent::new(token.clone(), reason.clone())).await;
                }
            },
        }
    }
}

async fn wait_for_resolution(mut rx: watch::Receiver<Option<Resolution>>) -> Option<Resolution> {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return Some(result);
        }
        if rx.changed().await.is_err() {
            // The leader went away. Whatever it left behind is final
            return rx.borrow().clone();
        }
    }
}

fn validate_lines(intent: &OrderIntent) -> Result<Vec<OrderLine>, RejectReason> {
    if intent.lines.is_empty() {
        return Err(RejectReason::EmptyOrder);
    }
    if let Some(line) = intent.lines.iter().find(|l| l.quantity <= 0) {
        return Err(RejectReason::InvalidQuantity { product_id: line.product_id, quantity: line.quantity });
    }
    intent.merged_lines().ok_or_else(|| {
        let line = intent.lines[0];
        RejectReason::InvalidQuantity { product_id: line.product_id, quantity: line.quantity }
    })
}

fn order_total(lines: &[PricedLine]) -> Result<Money, RejectReason> {
    lines.iter().try_fold(Money::ZERO, |total, line| {
        line.unit_price
            .checked_mul(line.quantity)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or(RejectReason::InvalidQuantity { product_id: line.product_id, quantity: line.quantity })
    })
}
