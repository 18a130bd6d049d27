use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::{json, Value};
use vending_engine::{memory::MemoryStore, pipeline::payloads::CommandEnvelope, PublishError};

use super::{
    helpers::{post_request, test_pipeline},
    mocks::MockPublisher,
};
use crate::routes::DispatchCommandRoute;

fn command(name: &str, value: Value) -> Value {
    json!({ "command": name, "value": value })
}

#[actix_web::test]
async fn change_temperature() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/machines/VM-01/command", command("CHANGE_TEMPERATURE", json!(4.5)), |cfg| {
        let mut publisher = MockPublisher::new();
        publisher
            .expect_publish()
            .withf(|topic, payload| {
                let envelope = serde_json::from_slice::<CommandEnvelope>(payload).unwrap();
                topic == "device/VM-01/command" && envelope.command == "CHANGE_TEMPERATURE"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        configure_with(cfg, publisher)
    })
    .await
    .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let envelope: CommandEnvelope = serde_json::from_str(&body).unwrap();
    assert_eq!(envelope.command, "CHANGE_TEMPERATURE");
    assert_eq!(envelope.value, json!(4.5));
    assert!(envelope.timestamp > 0);
}

#[actix_web::test]
async fn set_status_by_name() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/machines/VM-01/command", command("set_status", json!("maintenance")), configure_online)
            .await
            .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let envelope: CommandEnvelope = serde_json::from_str(&body).unwrap();
    assert_eq!(envelope.command, "SET_STATUS");
    assert_eq!(envelope.value, json!(2));
}

#[actix_web::test]
async fn temperature_out_of_range() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/machines/VM-01/command", command("CHANGE_TEMPERATURE", json!(45)), configure_silent)
            .await
            .expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("outside the safe range"), "{body}");
}

#[actix_web::test]
async fn unknown_command() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/machines/VM-01/command", command("REBOOT", Value::Null), configure_silent)
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid command. Unknown command REBOOT"}"#);
}

#[actix_web::test]
async fn invalid_machine_code() {
    let _ = env_logger::try_init().ok();
    let (status, _) = post_request("/machines/VM+1/command", command("SET_STATUS", json!(1)), configure_silent)
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn broker_down() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/machines/VM-01/command", command("SET_STATUS", json!(1)), |cfg| {
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_, _| Err(PublishError::NotConnected("connection refused".into())));
        configure_with(cfg, publisher)
    })
    .await
    .expect("Request failed");
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("connection refused"), "{body}");
}

/// Invalid commands must never reach the broker.
fn configure_silent(cfg: &mut ServiceConfig) {
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().never();
    configure_with(cfg, publisher)
}

fn configure_online(cfg: &mut ServiceConfig) {
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().times(1).returning(|_, _| Ok(()));
    configure_with(cfg, publisher)
}

fn configure_with(cfg: &mut ServiceConfig, publisher: MockPublisher) {
    let pipeline = test_pipeline(publisher);
    cfg.service(DispatchCommandRoute::<MemoryStore, MockPublisher>::new()).app_data(web::Data::new(pipeline));
}
