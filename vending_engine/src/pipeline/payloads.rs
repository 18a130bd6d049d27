//! JSON payloads exchanged with devices and clients over the broker.
//!
//! Devices speak camelCase. The snake_case spellings are accepted as aliases so that operators can hand-craft test
//! messages either way.
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    pipeline::RejectReason,
    vm_types::{
        CorrelationToken,
        DeviceStatus,
        MachineCode,
        MachineId,
        Money,
        OrderIntent,
        OrderLine,
        ProductId,
        ReconciledOrder,
        StateReport,
        UserId,
    },
};

/// Alert text devices send when nothing is wrong.
pub const NO_ALERT_MARKERS: [&str; 3] = ["", "无", "none"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload {
    #[serde(default, alias = "machine_id", alias = "machineCode", alias = "machine_code")]
    machine_id: Option<serde_json::Value>,
    #[serde(default)]
    temperature: Option<f64>,
    status: serde_json::Value,
    #[serde(default, alias = "alert")]
    alerts: Option<String>,
}

/// Parses a state report published on the topic for `code`. If the payload names a machine, it must be the same one.
pub fn parse_state_report(code: &MachineCode, payload: &[u8]) -> Result<StateReport, String> {
    let payload: StatePayload = serde_json::from_slice(payload).map_err(|e| format!("Invalid state payload. {e}"))?;
    if let Some(id) = payload.machine_id {
        let named = match id {
            serde_json::Value::String(s) => s,
            v => v.to_string(),
        };
        if named.trim() != code.as_str() {
            return Err(format!("Payload names machine '{named}', but was published for '{code}'"));
        }
    }
    let status = DeviceStatus::try_from(&payload.status).map_err(|e| e.to_string())?;
    let alert = payload.alerts.filter(|a| !NO_ALERT_MARKERS.iter().any(|m| m.eq_ignore_ascii_case(a.trim())));
    Ok(StateReport { machine_code: code.clone(), status, temperature: payload.temperature, alert })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentItem {
    #[serde(alias = "product_id")]
    pub product_id: ProductId,
    pub quantity: i64,
}

/// The payload of an order intent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentPayload {
    /// The correlation token. Devices call it `orderId`.
    #[serde(default, alias = "token", alias = "order_id", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "machine_id")]
    pub machine_id: MachineId,
    #[serde(default, alias = "lines")]
    pub items: Vec<IntentItem>,
    #[serde(default, alias = "total_amount", alias = "declaredTotal", skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Money>,
    /// Submission time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl IntentPayload {
    pub fn from_intent(intent: &OrderIntent) -> Self {
        Self {
            order_id: Some(intent.token.to_string()),
            user_id: intent.user_id,
            machine_id: intent.machine_id,
            items: intent.lines.iter().map(|l| IntentItem { product_id: l.product_id, quantity: l.quantity }).collect(),
            total_amount: intent.declared_total,
            timestamp: Some(intent.submitted_at.timestamp_millis()),
        }
    }

    /// Builds the intent for a message published under `token`. If the payload carries its own token, it must match.
    pub fn into_intent(self, token: CorrelationToken, received_at: DateTime<Utc>) -> Result<OrderIntent, String> {
        if let Some(id) = &self.order_id {
            if id.trim() != token.as_str() {
                return Err(format!("Payload token '{id}' does not match topic token '{token}'"));
            }
        }
        let submitted_at = self.timestamp.and_then(|ms| Utc.timestamp_millis_opt(ms).single()).unwrap_or(received_at);
        Ok(OrderIntent {
            token,
            user_id: self.user_id,
            machine_id: self.machine_id,
            lines: self.items.into_iter().map(|i| OrderLine::new(i.product_id, i.quantity)).collect(),
            submitted_at,
            declared_total: self.total_amount,
        })
    }
}

/// The message published on the outcome topic once an intent is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    Reconciled { token: CorrelationToken, order: ReconciledOrder },
    Rejected { token: CorrelationToken, reason: RejectReason },
}

impl OrderOutcome {
    pub fn new(token: CorrelationToken, result: &Result<ReconciledOrder, RejectReason>) -> Self {
        match result {
            Ok(order) => OrderOutcome::Reconciled { token, order: order.clone() },
            Err(reason) => OrderOutcome::Rejected { token, reason: reason.clone() },
        }
    }
}

/// The message published on a device's command topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub value: serde_json::Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}
