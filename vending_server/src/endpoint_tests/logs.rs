use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{DateTime, TimeZone, Utc};
use vending_engine::{
    memory::MemoryStore,
    vm_types::{LogCategory, LogEntry},
};

use super::{
    helpers::{get_request, ingest, test_pipeline},
    mocks::MockPublisher,
};
use crate::routes::LogsRoute;

fn at_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

#[actix_web::test]
async fn fetch_log_since() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/logs/heartbeat?since=1000", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let entries: Vec<LogEntry> = serde_json::from_str(&body).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.category == LogCategory::Heartbeat && e.timestamp > 1000));
    assert_eq!(entries[0].topic, "device/VM-02/heartbeat");
    assert_eq!(entries[1].topic, "device/VM-03/heartbeat");
}

#[actix_web::test]
async fn fetch_whole_log_with_limit() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/logs/heartbeat?limit=1", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let entries: Vec<LogEntry> = serde_json::from_str(&body).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].timestamp, 3000);
}

#[actix_web::test]
async fn nothing_new() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/logs/heartbeat?since=3000", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[actix_web::test]
async fn unclassified_messages_are_logged() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/logs/unclassified", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let entries: Vec<LogEntry> = serde_json::from_str(&body).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload, "sunny");
}

#[actix_web::test]
async fn unknown_category() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/logs/weather", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("'weather' is not a log category"), "{body}");
}

fn configure(cfg: &mut ServiceConfig) {
    let pipeline = test_pipeline(MockPublisher::new());
    ingest(&pipeline, "device/VM-01/heartbeat", "{}", at_millis(1000));
    ingest(&pipeline, "device/VM-02/heartbeat", "{}", at_millis(2000));
    ingest(&pipeline, "device/VM-03/heartbeat", "{}", at_millis(3000));
    ingest(&pipeline, "weather/today", "sunny", at_millis(3500));
    cfg.service(LogsRoute::<MemoryStore, MockPublisher>::new()).app_data(web::Data::new(pipeline));
}
