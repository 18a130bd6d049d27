use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use vending_engine::{memory::MemoryStore, vm_types::DeviceStatus};

use super::{
    helpers::{delete_request, get_request, ingest, test_pipeline},
    mocks::MockPublisher,
};
use crate::{
    data_objects::{DeviceDto, MAX_ALERT_DISPLAY_LENGTH},
    routes::{DevicesRoute, EvictDeviceRoute},
};

const LONG_ALERT: &str =
    "Compressor fault detected on the main cooling circuit. Temperature rising. Service visit required.";

#[actix_web::test]
async fn fetch_devices() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/devices", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let devices: Vec<DeviceDto> = serde_json::from_str(&body).unwrap();
    assert_eq!(devices.len(), 2);

    let vm1 = &devices[0];
    assert_eq!(vm1.machine_code, "VM-01");
    assert_eq!(vm1.status, None);
    assert!(vm1.is_live);

    let vm2 = &devices[1];
    assert_eq!(vm2.machine_code, "VM-02");
    assert_eq!(vm2.status, Some(DeviceStatus::Maintenance));
    assert_eq!(vm2.temperature, Some(7.5));
    assert!(!vm2.is_live);
    let alert = vm2.alert.as_deref().unwrap();
    assert!(alert.ends_with("..."));
    assert_eq!(alert.chars().count(), MAX_ALERT_DISPLAY_LENGTH + 3);
}

#[actix_web::test]
async fn evict_device() {
    let _ = env_logger::try_init().ok();
    let (status, body) = delete_request("/devices/VM-01", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Device VM-01 evicted"}"#);
}

#[actix_web::test]
async fn evict_unknown_device() {
    let _ = env_logger::try_init().ok();
    let (status, body) = delete_request("/devices/VM-09", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Device VM-09 is not in the registry"}"#);
}

#[actix_web::test]
async fn evict_invalid_machine_code() {
    let _ = env_logger::try_init().ok();
    let (status, _) = delete_request("/devices/VM+1", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn configure(cfg: &mut ServiceConfig) {
    let now = Utc::now();
    let pipeline = test_pipeline(MockPublisher::new());
    ingest(&pipeline, "device/VM-01/heartbeat", "{}", now);
    let state = serde_json::json!({ "status": 2, "temperature": 7.5, "alerts": LONG_ALERT }).to_string();
    ingest(&pipeline, "device/VM-02/state", &state, now - Duration::seconds(150));
    cfg.service(DevicesRoute::<MemoryStore, MockPublisher>::new())
        .service(EvictDeviceRoute::<MemoryStore, MockPublisher>::new())
        .app_data(web::Data::new(pipeline));
}
