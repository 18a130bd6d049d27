//! The MQTT side of the server.
//!
//! [`connect`] builds the client. The [`MqttPublisher`] half is handed to the pipeline for outbound messages, and the
//! event loop half is driven by [`run_mqtt_bridge`], which (re)subscribes to the pipeline's topics on every connection
//! and forwards every publish it receives, stamped with its arrival time, to the ingestion lanes.
use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use log::*;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::{sync::mpsc, task::JoinHandle};
use vending_engine::{
    pipeline::{report_ingest_error, Accepted},
    vm_types::BrokerMessage,
    MessagePublisher,
    PublishError,
    VendingBackend,
    VendingPipeline,
};

use crate::{config::MqttConfig, errors::ServerError};

const DEFAULT_MQTT_PORT: u16 = 1883;
const CLIENT_CAPACITY: usize = 100;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl std::fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MqttPublisher")
    }
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}

impl MessagePublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| PublishError::NotConnected(e.to_string()))
    }
}

/// Creates the MQTT client. Nothing is sent until the event loop is polled.
pub fn connect(config: &MqttConfig) -> Result<(MqttPublisher, EventLoop), ServerError> {
    let (host, port) = parse_broker_url(&config.broker_url)?;
    let mut options = MqttOptions::new(config.client_id.as_str(), host, port);
    options.set_keep_alive(config.keep_alive);
    if let Some(username) = &config.username {
        options.set_credentials(username.as_str(), config.password.reveal().as_str());
    }
    let (client, eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
    info!("📡️ MQTT client {} configured for {host}:{port}", config.client_id);
    Ok((MqttPublisher::new(client), eventloop))
}

/// Splits `mqtt://host:port` (or `tcp://host:port`, or `host:port`, or just `host`) into its parts.
pub fn parse_broker_url(url: &str) -> Result<(&str, u16), ServerError> {
    let url = url.trim().trim_start_matches("mqtt://").trim_start_matches("tcp://").trim_end_matches('/');
    let parts = url.split(':').collect::<Vec<_>>();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, DEFAULT_MQTT_PORT)),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ServerError::ConfigurationError(format!("Invalid port in broker URL: {port}")))?;
            Ok((*host, port))
        },
        _ => Err(ServerError::ConfigurationError(format!("Invalid broker URL: {url}"))),
    }
}

/// Drives the MQTT event loop until the ingestion lanes go away.
///
/// Subscriptions are renewed on every `ConnAck`, since a clean session forgets them across reconnects. Connection
/// errors are logged and retried after a short delay.
pub async fn run_mqtt_bridge(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Vec<String>,
    sender: mpsc::Sender<BrokerMessage>,
) {
    info!("📡️ MQTT bridge started");
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = BrokerMessage::new(publish.topic, publish.payload.to_vec(), Utc::now());
                trace!("📡️ Received message on {}", msg.topic);
                if sender.send(msg).await.is_err() {
                    info!("📡️ Ingestion has stopped. Closing the MQTT bridge");
                    break;
                }
            },
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("📡️ Connected to the MQTT broker");
                for topic in &subscriptions {
                    match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => debug!("📡️ Subscribing to {topic}"),
                        Err(e) => error!("📡️ Could not subscribe to {topic}. {e}"),
                    }
                }
            },
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                debug!("📡️ Subscription acknowledged");
            },
            Ok(_) => {},
            Err(e) => {
                error!("📡️ MQTT connection error. {e}. Retrying in {}s", RECONNECT_DELAY.as_secs());
                tokio::time::sleep(RECONNECT_DELAY).await;
            },
        }
    }
}

/// Feeds broker messages into the pipeline.
///
/// Every message is accepted (classified and logged) in arrival order. Device updates are applied inline, which keeps
/// them in arrival order too. Order intents are reconciled on their own tasks so a slow settlement never holds up
/// device telemetry. Once the channel closes, the lanes wait for in-flight reconciliations before returning.
///
/// Reconciliation futures are not `Send`, so this must run on a local task set, e.g. via `actix_web::rt::spawn`.
pub async fn run_ingestion_lanes<B, P>(pipeline: Arc<VendingPipeline<B, P>>, mut receiver: mpsc::Receiver<BrokerMessage>)
where
    B: VendingBackend + 'static,
    P: MessagePublisher + 'static,
{
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
    while let Some(msg) = receiver.recv().await {
        match pipeline.accept(&msg) {
            Ok(Accepted::Device(update)) => pipeline.apply_device_update(update),
            Ok(Accepted::Intent(intent)) => {
                let pipeline = Arc::clone(&pipeline);
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(actix_web::rt::spawn(async move {
                    let token = intent.token.clone();
                    match pipeline.reconcile(intent).await {
                        Ok(order) => debug!("📡️ {token} settled as order #{}", order.order_id),
                        Err(reason) => debug!("📡️ {token} rejected. {reason}"),
                    }
                }));
            },
            Ok(Accepted::Recorded(category)) => trace!("📡️ {} recorded in the {category} log", msg.topic),
            Err(e) => report_ingest_error(&e),
        }
    }
    debug!("📡️ Ingestion channel closed. Waiting for {} reconciliations", in_flight.len());
    join_all(in_flight).await;
    info!("📡️ Ingestion lanes stopped");
}
