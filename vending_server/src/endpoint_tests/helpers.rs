use std::sync::Arc;

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;
use vending_engine::{
    events::EventProducers,
    memory::MemoryStore,
    pipeline::Accepted,
    vm_types::{BrokerMessage, MachineId, Money, ProductId, UserId},
    PipelineConfig,
    VendingPipeline,
};

use super::mocks::MockPublisher;

pub type TestPipeline = VendingPipeline<MemoryStore, MockPublisher>;

/// User 1 has 10.00. Product 1 costs 3.00 and machine 1 holds 5 of them.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    store.add_user(UserId(1), Money::from_major(10));
    store.add_product(ProductId(1), Money::from_major(3));
    store.set_stock(MachineId(1), ProductId(1), 5);
    store
}

pub fn test_pipeline(publisher: MockPublisher) -> TestPipeline {
    VendingPipeline::new(PipelineConfig::default(), seeded_store(), Arc::new(publisher), EventProducers::default())
        .expect("Default topics are valid")
}

/// Runs a message through the synchronous half of ingestion, as the device lane does.
pub fn ingest(pipeline: &TestPipeline, topic: &str, payload: &str, at: DateTime<Utc>) {
    let msg = BrokerMessage::new(topic, payload, at);
    if let Ok(Accepted::Device(update)) = pipeline.accept(&msg) {
        pipeline.apply_device_update(update);
    }
}

pub async fn get_request<F>(path: &str, configure: F) -> Result<(StatusCode, String), String>
where F: FnOnce(&mut ServiceConfig) {
    send_request(TestRequest::get().uri(path), configure).await
}

pub async fn delete_request<F>(path: &str, configure: F) -> Result<(StatusCode, String), String>
where F: FnOnce(&mut ServiceConfig) {
    send_request(TestRequest::delete().uri(path), configure).await
}

pub async fn post_request<F>(path: &str, body: Value, configure: F) -> Result<(StatusCode, String), String>
where F: FnOnce(&mut ServiceConfig) {
    send_request(TestRequest::post().uri(path).set_json(body), configure).await
}

async fn send_request<F>(req: TestRequest, configure: F) -> Result<(StatusCode, String), String>
where F: FnOnce(&mut ServiceConfig) {
    let req = req.to_request();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
