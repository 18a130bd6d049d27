use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vending_engine::{
    pipeline::payloads::{IntentItem, OrderOutcome},
    vm_types::{DeviceStatus, DeviceView, MachineId, Money, UserId},
    TokenStatus,
};

/// Alerts longer than this are cut short in device listings. The registry keeps the full text.
pub const MAX_ALERT_DISPLAY_LENGTH: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

//----------------------------------------------   Devices  ----------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub machine_code: String,
    pub status: Option<DeviceStatus>,
    pub temperature: Option<f64>,
    /// Milliseconds since the Unix epoch.
    pub last_heartbeat: i64,
    pub alert: Option<String>,
    pub is_live: bool,
}

impl From<DeviceView> for DeviceDto {
    fn from(view: DeviceView) -> Self {
        let record = view.record;
        Self {
            machine_code: record.machine_code.to_string(),
            status: record.status,
            temperature: record.temperature,
            last_heartbeat: record.last_heartbeat.timestamp_millis(),
            alert: record.alert.map(|a| truncate_alert(&a)),
            is_live: view.is_live,
        }
    }
}

pub fn truncate_alert(alert: &str) -> String {
    match alert.char_indices().nth(MAX_ALERT_DISPLAY_LENGTH) {
        Some((end, _)) => format!("{}...", &alert[..end]),
        None => alert.to_string(),
    }
}

//----------------------------------------------   Logs  ----------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Only entries stamped strictly after this time (milliseconds since the Unix epoch) are returned.
    #[serde(default)]
    pub since: i64,
    pub limit: Option<usize>,
}

//----------------------------------------------   Orders  ----------------------------------------------------
/// A request to submit an order intent. If no token is given, the server generates one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    #[serde(default, alias = "orderId")]
    pub token: Option<String>,
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "machine_id")]
    pub machine_id: MachineId,
    #[serde(default)]
    pub items: Vec<IntentItem>,
    #[serde(default, alias = "totalAmount")]
    pub declared_total: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAccepted {
    pub token: String,
    pub topic: String,
}

/// The state of an order intent, as reported by the polling API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntentStatusDto {
    Pending { token: String, status: String },
    Resolved(OrderOutcome),
}

impl IntentStatusDto {
    /// `None` if the engine has never seen the token.
    pub fn from_status(token: &str, status: TokenStatus) -> Option<Self> {
        match status {
            TokenStatus::Unknown => None,
            TokenStatus::Pending => Some(Self::Pending { token: token.to_string(), status: "pending".into() }),
            TokenStatus::Resolved(outcome) => Some(Self::Resolved(outcome)),
        }
    }
}

//----------------------------------------------   Commands  ----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub value: Value,
}
