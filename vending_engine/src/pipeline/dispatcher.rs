use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;
use serde_json::{json, Value};

use crate::{
    pipeline::{log_store::LogStore, payloads::CommandEnvelope, topics::Topics, CommandError},
    traits::MessagePublisher,
    vm_types::{DeviceStatus, LogCategory, MachineCode, ProductId},
};

pub const CHANGE_TEMPERATURE: &str = "CHANGE_TEMPERATURE";
pub const SET_STATUS: &str = "SET_STATUS";
pub const DISPENSE_PRODUCT: &str = "DISPENSE_PRODUCT";

/// A validated operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    ChangeTemperature(f64),
    SetStatus(DeviceStatus),
    DispenseProduct { product_id: ProductId, quantity: i64 },
}

impl DeviceCommand {
    /// Checks a command name and value against the whitelist. Temperatures must fall within `[min, max]`.
    pub fn parse(name: &str, value: &Value, min: f64, max: f64) -> Result<Self, CommandError> {
        let name = name.trim().to_ascii_uppercase();
        let invalid = |reason: String| CommandError::InvalidValue { command: name.clone(), reason };
        match name.as_str() {
            CHANGE_TEMPERATURE => {
                let t = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|t| t.is_finite())
                .ok_or_else(|| invalid(format!("{value} is not a number")))?;
                if t < min || t > max {
                    return Err(CommandError::TemperatureOutOfRange { value: t, min, max });
                }
                Ok(DeviceCommand::ChangeTemperature(t))
            },
            SET_STATUS => DeviceStatus::try_from(value).map(DeviceCommand::SetStatus).map_err(|e| invalid(e.to_string())),
            DISPENSE_PRODUCT => {
                let field = |names: [&str; 2]| names.iter().find_map(|n| value.get(*n)).and_then(Value::as_i64);
                let product_id = field(["productId", "product_id"])
                    .map(ProductId)
                    .ok_or_else(|| invalid("a productId is required".into()))?;
                let quantity = match value.get("quantity") {
                    None => 1,
                    Some(q) => q.as_i64().ok_or_else(|| invalid(format!("{q} is not a quantity")))?,
                };
                if quantity < 1 {
                    return Err(invalid(format!("quantity must be at least 1, not {quantity}")));
                }
                Ok(DeviceCommand::DispenseProduct { product_id, quantity })
            },
            _ => Err(CommandError::UnknownCommand(name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::ChangeTemperature(_) => CHANGE_TEMPERATURE,
            DeviceCommand::SetStatus(_) => SET_STATUS,
            DeviceCommand::DispenseProduct { .. } => DISPENSE_PRODUCT,
        }
    }

    /// The value in the form devices expect.
    pub fn value(&self) -> Value {
        match self {
            DeviceCommand::ChangeTemperature(t) => json!(t),
            DeviceCommand::SetStatus(s) => json!(s.code()),
            DeviceCommand::DispenseProduct { product_id, quantity } => {
                json!({ "productId": product_id, "quantity": quantity })
            },
        }
    }
}

/// Publishes validated operator commands to device command topics, and records them in the command log.
///
/// Delivery is fire-and-forget. Devices do not acknowledge commands; their next state report reflects the result.
pub struct CommandDispatcher<P> {
    publisher: Arc<P>,
    log: Arc<LogStore>,
    topics: Topics,
    min_temperature: f64,
    max_temperature: f64,
}

impl<P> Debug for CommandDispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommandDispatcher [{}, {}]", self.min_temperature, self.max_temperature)
    }
}

impl<P> CommandDispatcher<P> {
    pub fn new(publisher: Arc<P>, log: Arc<LogStore>, topics: Topics, min_temperature: f64, max_temperature: f64) -> Self {
        Self { publisher, log, topics, min_temperature, max_temperature }
    }
}

impl<P: MessagePublisher> CommandDispatcher<P> {
    /// Validates and sends a command. Nothing is published or logged if validation fails.
    pub async fn dispatch(&self, machine_code: &str, command: &str, value: Value) -> Result<CommandEnvelope, CommandError> {
        let code = machine_code.parse::<MachineCode>().map_err(|e| CommandError::InvalidMachineCode(e.to_string()))?;
        let command = DeviceCommand::parse(command, &value, self.min_temperature, self.max_temperature)
            .inspect_err(|e| info!("📣️ Command for {code} rejected. {e}"))?;
        let now = Utc::now();
        let envelope =
            CommandEnvelope { command: command.name().to_string(), value: command.value(), timestamp: now.timestamp_millis() };
        let payload = serde_json::to_string(&envelope).map_err(|e| CommandError::PublishFailed(e.into()))?;
        let topic = self.topics.command(&code);
        self.publisher.publish(&topic, payload.as_bytes()).await.inspect_err(|e| {
            warn!("📣️ Could not publish {} to {topic}. {e}", envelope.command);
        })?;
        self.log.append(LogCategory::Command, &topic, &payload, now);
        info!("📣️ {} sent to {code}", envelope.command);
        Ok(envelope)
    }
}
