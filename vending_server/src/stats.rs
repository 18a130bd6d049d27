use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
        PoisonError,
    },
};

use futures::FutureExt;
use log::*;
use serde::{Deserialize, Serialize};
use vending_engine::{events::EventHooks, RejectReason};

/// Running totals of order outcomes since the server started. Fed by the engine's event hooks.
#[derive(Debug, Default)]
pub struct OutcomeStats {
    reconciled: AtomicU64,
    rejected: Mutex<BTreeMap<&'static str, u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub orders_reconciled: u64,
    /// Rejection counts, keyed by reason.
    pub orders_rejected: BTreeMap<String, u64>,
    pub tracked_tokens: usize,
    pub dropped_messages: u64,
    pub devices: usize,
}

impl OutcomeStats {
    pub fn record_reconciled(&self) {
        self.reconciled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: &RejectReason) {
        let mut rejected = self.rejected.lock().unwrap_or_else(PoisonError::into_inner);
        *rejected.entry(reason.label()).or_default() += 1;
    }

    pub fn reconciled(&self) -> u64 {
        self.reconciled.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> BTreeMap<String, u64> {
        let rejected = self.rejected.lock().unwrap_or_else(PoisonError::into_inner);
        rejected.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }
}

/// Hooks that keep `stats` up to date.
pub fn stats_hooks(stats: Arc<OutcomeStats>) -> EventHooks {
    let mut hooks = EventHooks::default();
    let on_reconciled = Arc::clone(&stats);
    hooks.on_order_reconciled(move |ev| {
        trace!("📬️ Order #{} counted", ev.order.order_id);
        on_reconciled.record_reconciled();
        async {}.boxed()
    });
    hooks.on_order_rejected(move |ev| {
        trace!("📬️ Rejection of {} counted", ev.token);
        stats.record_rejected(&ev.reason);
        async {}.boxed()
    });
    hooks
}
