use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;
use serde_json::Value;

use crate::{
    events::EventProducers,
    pipeline::{
        device_registry::DeviceRegistry,
        dispatcher::CommandDispatcher,
        log_store::LogStore,
        payloads::{parse_state_report, CommandEnvelope, IntentPayload},
        reconciler::{Reconciler, Resolution, TokenStatus},
        topic_router::TopicRouter,
        topics::{InvalidPattern, Topics},
        CommandError,
        IngestError,
        PipelineConfig,
    },
    traits::{MessagePublisher, PublishError, VendingBackend},
    vm_types::{
        BrokerMessage,
        CorrelationToken,
        DeviceRecord,
        DeviceView,
        LogCategory,
        LogEntry,
        MachineCode,
        OrderIntent,
        StateReport,
    },
};

/// Log target for messages that could not be ingested.
pub const INGEST_ERRORS_TARGET: &str = "vmp::ingest_errors";

/// A device message, ready to be applied to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceUpdate {
    Heartbeat { code: MachineCode, at: DateTime<Utc> },
    State { report: StateReport, at: DateTime<Utc> },
}

impl DeviceUpdate {
    pub fn machine_code(&self) -> &MachineCode {
        match self {
            DeviceUpdate::Heartbeat { code, .. } => code,
            DeviceUpdate::State { report, .. } => &report.machine_code,
        }
    }
}

/// A message that has been classified and logged.
#[derive(Debug, Clone, PartialEq)]
pub enum Accepted {
    Device(DeviceUpdate),
    Intent(OrderIntent),
    /// The message is only logged. Outcomes and echoed commands fall in this class.
    Recorded(LogCategory),
}

/// The pipeline context. One instance owns the log store, the device registry, the reconciliation engine and the
/// command dispatcher, and is shared by reference between the ingestion lanes and the polling API.
///
/// Ingestion is split in two so that callers can choose how to schedule the work. [`VendingPipeline::accept`] is
/// synchronous and cheap: it classifies a message, appends it to the log and parses its payload. Device updates must
/// then be applied in arrival order, while intents may be reconciled concurrently. [`VendingPipeline::process`] does
/// both steps for a single message.
pub struct VendingPipeline<B, P> {
    config: PipelineConfig,
    topics: Topics,
    router: TopicRouter,
    log: Arc<LogStore>,
    registry: DeviceRegistry,
    reconciler: Reconciler<B, P>,
    dispatcher: CommandDispatcher<P>,
    publisher: Arc<P>,
}

impl<B, P> Debug for VendingPipeline<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VendingPipeline ({:?})", self.config)
    }
}

impl<B, P> VendingPipeline<B, P> {
    pub fn new(config: PipelineConfig, db: B, publisher: Arc<P>, producers: EventProducers) -> Result<Self, InvalidPattern> {
        let topics = Topics::new(&config.topic_root);
        let router = TopicRouter::new(&topics)?;
        let log = Arc::new(LogStore::new(config.log_capacity));
        let registry = DeviceRegistry::new(config.liveness_window);
        let reconciler = Reconciler::new(
            db,
            Arc::clone(&publisher),
            producers,
            topics.clone(),
            config.settlement_timeout,
            config.idempotency_retention,
        );
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&publisher),
            Arc::clone(&log),
            topics.clone(),
            config.min_temperature,
            config.max_temperature,
        );
        Ok(Self { config, topics, router, log, registry, reconciler, dispatcher, publisher })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn db(&self) -> &B {
        self.reconciler.db()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log
    }

    /// The patterns an inbound bridge should subscribe to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.topics.subscriptions()
    }

    /// Classifies a message, appends it to its category's log and parses it.
    ///
    /// Every message is logged, including those that are then rejected. Unrecognised topics are logged as
    /// unclassified.
    pub fn accept(&self, msg: &BrokerMessage) -> Result<Accepted, IngestError> {
        let route = self.router.classify(&msg.topic);
        self.log.append(route.category, &msg.topic, &msg.payload_str(), msg.received_at);
        let accepted = match (route.category, route.segment) {
            (LogCategory::Heartbeat, Some(code)) => {
                let code = self.parse_code(&msg.topic, code)?;
                Accepted::Device(DeviceUpdate::Heartbeat { code, at: msg.received_at })
            },
            (LogCategory::State, Some(code)) => {
                let code = self.parse_code(&msg.topic, code)?;
                let report = parse_state_report(&code, &msg.payload).map_err(|e| self.malformed(&msg.topic, e))?;
                Accepted::Device(DeviceUpdate::State { report, at: msg.received_at })
            },
            (LogCategory::Order, Some(token)) => {
                let token = token.parse::<CorrelationToken>().map_err(|e| self.malformed(&msg.topic, e))?;
                let payload = serde_json::from_slice::<IntentPayload>(&msg.payload)
                    .map_err(|e| self.malformed(&msg.topic, format!("Invalid intent payload. {e}")))?;
                let intent = payload.into_intent(token, msg.received_at).map_err(|e| self.malformed(&msg.topic, e))?;
                Accepted::Intent(intent)
            },
            (LogCategory::Unclassified, _) | (_, None) => {
                self.router.record_drop(&msg.topic);
                return Err(IngestError::UnknownTopic(msg.topic.clone()));
            },
            (category, Some(_)) => Accepted::Recorded(category),
        };
        Ok(accepted)
    }

    /// Applies a device update to the registry. Updates for a device must be applied in arrival order.
    pub fn apply_device_update(&self, update: DeviceUpdate) {
        match update {
            DeviceUpdate::Heartbeat { code, at } => self.registry.ingest_heartbeat(&code, at),
            DeviceUpdate::State { report, at } => self.registry.ingest_state(report, at),
        }
    }

    /// Every device that has reported in, with liveness evaluated at `now`.
    pub fn device_snapshot(&self, now: DateTime<Utc>) -> Vec<DeviceView> {
        self.registry.snapshot(now)
    }

    /// Removes a device from the registry, e.g. after it has been deleted from the machine inventory.
    pub fn evict_device(&self, code: &MachineCode) -> Option<DeviceRecord> {
        self.registry.evict(code)
    }

    /// Log entries in `category` stamped after `since` (milliseconds since the Unix epoch), oldest first. With a
    /// `limit`, only the most recent entries are returned.
    pub fn log(&self, category: LogCategory, since: i64, limit: Option<usize>) -> Vec<LogEntry> {
        self.log.query(category, since, limit)
    }

    pub fn order_status(&self, token: &CorrelationToken) -> TokenStatus {
        self.reconciler.status(token)
    }

    /// Drops expired tokens from the idempotency map.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        self.reconciler.evict_expired(now)
    }

    pub fn tracked_tokens(&self) -> usize {
        self.reconciler.tracked_tokens()
    }

    pub fn dropped_messages(&self) -> u64 {
        self.router.dropped()
    }

    fn parse_code(&self, topic: &str, code: &str) -> Result<MachineCode, IngestError> {
        code.parse::<MachineCode>().map_err(|e| self.malformed(topic, e))
    }

    fn malformed<R: ToString>(&self, topic: &str, reason: R) -> IngestError {
        self.router.record_drop(topic);
        IngestError::malformed(topic, reason)
    }
}

impl<B, P> VendingPipeline<B, P>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    /// Accepts and processes a single message. Returns the resolution if the message was an order intent.
    pub async fn process(&self, msg: BrokerMessage) -> Result<Option<Resolution>, IngestError> {
        match self.accept(&msg)? {
            Accepted::Device(update) => {
                self.apply_device_update(update);
                Ok(None)
            },
            Accepted::Intent(intent) => Ok(Some(self.reconcile(intent).await)),
            Accepted::Recorded(_) => Ok(None),
        }
    }

    /// Like [`VendingPipeline::process`], but ingestion errors are reported on the `vmp::ingest_errors` log target
    /// instead of being returned.
    pub async fn handle_message(&self, msg: BrokerMessage) {
        if let Err(e) = self.process(msg).await {
            report_ingest_error(&e);
        }
    }

    pub async fn reconcile(&self, intent: OrderIntent) -> Resolution {
        self.reconciler.reconcile(intent).await
    }

    /// Publishes an order intent to its intent topic. The outcome arrives asynchronously on the outcome topic.
    pub async fn submit_order_intent(&self, intent: &OrderIntent) -> Result<String, PublishError> {
        let topic = self.topics.intent(&intent.token);
        let payload = serde_json::to_vec(&IntentPayload::from_intent(intent))?;
        self.publisher.publish(&topic, &payload).await?;
        debug!("🚦️ Submitted intent {} to {topic}", intent.token);
        Ok(topic)
    }

    pub async fn dispatch_command(
        &self,
        machine_code: &str,
        command: &str,
        value: Value,
    ) -> Result<CommandEnvelope, CommandError> {
        self.dispatcher.dispatch(machine_code, command, value).await
    }
}

/// Writes an ingestion failure to the `vmp::ingest_errors` log target.
pub fn report_ingest_error(e: &IngestError) {
    match e {
        IngestError::UnknownTopic(_) => debug!(target: INGEST_ERRORS_TARGET, "🚦️ {e}"),
        IngestError::MalformedMessage { .. } => warn!(target: INGEST_ERRORS_TARGET, "🚦️ {e}"),
    }
}
