use serde::{Deserialize, Serialize};

use crate::{
    pipeline::RejectReason,
    vm_types::{CorrelationToken, ReconciledOrder},
};

/// Emitted once for every intent that settles into a durable order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReconciledEvent {
    pub order: ReconciledOrder,
}

impl OrderReconciledEvent {
    pub fn new(order: ReconciledOrder) -> Self {
        Self { order }
    }
}

/// Emitted once for every intent resolution that does not produce an order, including non-terminal rejections such as
/// timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejectedEvent {
    pub token: CorrelationToken,
    pub reason: RejectReason,
}

impl OrderRejectedEvent {
    pub fn new(token: CorrelationToken, reason: RejectReason) -> Self {
        Self { token, reason }
    }
}
