use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use tokio::sync::mpsc;
use vending_engine::{events::EventHandlers, SqliteStore, VendingPipeline};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    maintenance_worker::start_maintenance_worker,
    mqtt::{connect, run_ingestion_lanes, run_mqtt_bridge, MqttPublisher},
    routes::{
        health,
        DevicesRoute,
        DispatchCommandRoute,
        EvictDeviceRoute,
        LogsRoute,
        OrderIntentStatusRoute,
        StatsRoute,
        SubmitOrderIntentRoute,
    },
    stats::{stats_hooks, OutcomeStats},
};

const DB_MAX_CONNECTIONS: u32 = 25;
const EVENT_BUFFER_SIZE: usize = 25;
const INGEST_BUFFER_SIZE: usize = 1024;

pub type ServerPipeline = VendingPipeline<SqliteStore, MqttPublisher>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteStore::new_with_url(&config.database_url, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let (publisher, eventloop) = connect(&config.mqtt)?;
    let client = publisher.client();

    let stats = Arc::new(OutcomeStats::default());
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, stats_hooks(Arc::clone(&stats)));
    let producers = handlers.producers();
    handlers.start_handlers();

    let pipeline = VendingPipeline::new(config.pipeline.clone(), db, Arc::new(publisher), producers)
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let pipeline = Arc::new(pipeline);
    info!("🚀️ Pipeline ready. Subscribing to {}", pipeline.subscriptions().join(", "));

    let (sender, receiver) = mpsc::channel(INGEST_BUFFER_SIZE);
    tokio::spawn(run_mqtt_bridge(eventloop, client, pipeline.subscriptions(), sender));
    actix_web::rt::spawn(run_ingestion_lanes(Arc::clone(&pipeline), receiver));
    let _maintenance = start_maintenance_worker(Arc::clone(&pipeline));

    let srv = create_server_instance(config, pipeline, stats)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    pipeline: Arc<ServerPipeline>,
    stats: Arc<OutcomeStats>,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let api_scope = web::scope("/api")
            .service(DevicesRoute::<SqliteStore, MqttPublisher>::new())
            .service(EvictDeviceRoute::<SqliteStore, MqttPublisher>::new())
            .service(LogsRoute::<SqliteStore, MqttPublisher>::new())
            .service(SubmitOrderIntentRoute::<SqliteStore, MqttPublisher>::new())
            .service(OrderIntentStatusRoute::<SqliteStore, MqttPublisher>::new())
            .service(DispatchCommandRoute::<SqliteStore, MqttPublisher>::new())
            .service(StatsRoute::<SqliteStore, MqttPublisher>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vmp::access_log"))
            .app_data(web::Data::from(Arc::clone(&pipeline)))
            .app_data(web::Data::from(Arc::clone(&stats)))
            .service(health)
            .service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
