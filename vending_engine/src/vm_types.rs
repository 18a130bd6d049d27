//! Data types shared by every stage of the pipeline.
//!
//! Identifiers coming from the relational store (users, machines, products, orders) are integer newtypes. Machine
//! *codes* are the external string identifiers that devices use in their topics, and correlation tokens are the
//! client-generated identifiers of order intents.
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;
pub use vm_common::Money;

//--------------------------------------   Identifiers   ---------------------------------------------------------
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(UserId);
id_type!(MachineId);
id_type!(ProductId);
id_type!(DurableOrderId);

/// The external identifier a vending machine uses in its broker topics, e.g. `VM-01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MachineCode(String);

impl MachineCode {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for MachineCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MachineCode {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidIdentifier("machine code is empty".into()));
        }
        if s.contains(['/', '+', '#']) {
            return Err(InvalidIdentifier(format!("machine code '{s}' contains a topic separator or wildcard")));
        }
        Ok(Self(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for MachineCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct InvalidIdentifier(pub String);

pub const MAX_TOKEN_LENGTH: usize = 128;

/// A client-generated correlation token for an order intent.
///
/// Tokens must be distinguishable from durable order ids, so a purely numeric token is rejected. Because the token is
/// also used as a topic segment, topic separators and wildcards are not allowed either.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for CorrelationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CorrelationToken {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidIdentifier("correlation token is empty".into()));
        }
        if s.len() > MAX_TOKEN_LENGTH {
            return Err(InvalidIdentifier(format!("correlation token is longer than {MAX_TOKEN_LENGTH} bytes")));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidIdentifier(format!("correlation token '{s}' could be mistaken for an order id")));
        }
        if s.contains(['/', '+', '#']) {
            return Err(InvalidIdentifier(format!("correlation token '{s}' contains a topic separator or wildcard")));
        }
        Ok(Self(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for CorrelationToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

//--------------------------------------   DeviceStatus   ---------------------------------------------------------
/// The operating status a device reports about itself. Devices send the numeric code; operators tend to use names.
/// Both are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Offline,
    Online,
    Maintenance,
}

impl DeviceStatus {
    pub fn code(&self) -> i64 {
        match self {
            DeviceStatus::Offline => 0,
            DeviceStatus::Online => 1,
            DeviceStatus::Maintenance => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceStatus::Offline => "offline",
            DeviceStatus::Online => "online",
            DeviceStatus::Maintenance => "maintenance",
        }
    }
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid device status: {0}")]
pub struct InvalidDeviceStatus(String);

impl TryFrom<i64> for DeviceStatus {
    type Error = InvalidDeviceStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceStatus::Offline),
            1 => Ok(DeviceStatus::Online),
            2 => Ok(DeviceStatus::Maintenance),
            v => Err(InvalidDeviceStatus(format!("{v} is not a status code"))),
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = InvalidDeviceStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Self::try_from(code);
        }
        match s.to_ascii_lowercase().as_str() {
            "offline" => Ok(DeviceStatus::Offline),
            "online" => Ok(DeviceStatus::Online),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            _ => Err(InvalidDeviceStatus(format!("'{s}' is not a status name"))),
        }
    }
}

impl TryFrom<&serde_json::Value> for DeviceStatus {
    type Error = InvalidDeviceStatus;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(n) => {
                n.as_i64().ok_or_else(|| InvalidDeviceStatus(format!("{n} is not a status code"))).and_then(Self::try_from)
            },
            serde_json::Value::String(s) => s.parse(),
            v => Err(InvalidDeviceStatus(format!("{v} is neither a status code nor a name"))),
        }
    }
}

impl Serialize for DeviceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DeviceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        DeviceStatus::try_from(&value).map_err(de::Error::custom)
    }
}

//--------------------------------------   Devices   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub machine_code: MachineCode,
    /// `None` until the device sends its first state report.
    pub status: Option<DeviceStatus>,
    pub temperature: Option<f64>,
    pub last_heartbeat: DateTime<Utc>,
    /// The full alert text, exactly as reported.
    pub alert: Option<String>,
}

impl DeviceRecord {
    pub fn new(machine_code: MachineCode, seen_at: DateTime<Utc>) -> Self {
        Self { machine_code, status: None, temperature: None, last_heartbeat: seen_at, alert: None }
    }
}

/// A [`DeviceRecord`] as observed at a particular instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub record: DeviceRecord,
    pub is_live: bool,
}

/// A parsed state report from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct StateReport {
    pub machine_code: MachineCode,
    pub status: DeviceStatus,
    pub temperature: Option<f64>,
    pub alert: Option<String>,
}

//--------------------------------------   Orders   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self { product_id, quantity }
    }
}

/// A client's request to buy products from a machine. The declared total is advisory and is never used for
/// settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub token: CorrelationToken,
    pub user_id: UserId,
    pub machine_id: MachineId,
    pub lines: Vec<OrderLine>,
    pub submitted_at: DateTime<Utc>,
    pub declared_total: Option<Money>,
}

impl OrderIntent {
    /// Merges lines for the same product. Returns `None` if the merged quantity overflows.
    pub fn merged_lines(&self) -> Option<Vec<OrderLine>> {
        let mut merged = BTreeMap::<ProductId, i64>::new();
        for line in &self.lines {
            let qty = merged.entry(line.product_id).or_default();
            *qty = qty.checked_add(line.quantity)?;
        }
        Some(merged.into_iter().map(|(product_id, quantity)| OrderLine { product_id, quantity }).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Everything the store needs to settle an order atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub token: CorrelationToken,
    pub user_id: UserId,
    pub machine_id: MachineId,
    pub lines: Vec<PricedLine>,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledOrder {
    pub order_id: DurableOrderId,
    pub token: CorrelationToken,
    pub user_id: UserId,
    pub machine_id: MachineId,
    pub lines: Vec<PricedLine>,
    pub total: Money,
    pub settled_at: DateTime<Utc>,
}

//--------------------------------------   Log entries   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Heartbeat,
    State,
    Order,
    Outcome,
    Command,
    Unclassified,
}

impl LogCategory {
    pub const ALL: [LogCategory; 6] = [
        LogCategory::Heartbeat,
        LogCategory::State,
        LogCategory::Order,
        LogCategory::Outcome,
        LogCategory::Command,
        LogCategory::Unclassified,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogCategory::Heartbeat => "heartbeat",
            LogCategory::State => "state",
            LogCategory::Order => "order",
            LogCategory::Outcome => "outcome",
            LogCategory::Command => "command",
            LogCategory::Unclassified => "unclassified",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for LogCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogCategory {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogCategory::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| InvalidIdentifier(format!("'{s}' is not a log category")))
    }
}

/// An immutable record of a raw broker message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub category: LogCategory,
    pub seq: u64,
    pub topic: String,
    pub payload: String,
    /// Arrival time in milliseconds since the Unix epoch. Strictly increasing within a category.
    pub timestamp: i64,
}

//--------------------------------------   Broker messages   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl BrokerMessage {
    pub fn new<T: Into<String>, P: Into<Vec<u8>>>(topic: T, payload: P, received_at: DateTime<Utc>) -> Self {
        Self { topic: topic.into(), payload: payload.into(), received_at }
    }

    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
