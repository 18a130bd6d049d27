use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use serde_json::{json, Value};
use vending_engine::{
    memory::MemoryStore,
    pipeline::payloads::IntentPayload,
    vm_types::{MachineId, OrderIntent, OrderLine, ProductId, UserId},
    PublishError,
};

use super::{
    helpers::{get_request, post_request, test_pipeline, TestPipeline},
    mocks::MockPublisher,
};
use crate::{
    data_objects::IntentAccepted,
    routes::{OrderIntentStatusRoute, SubmitOrderIntentRoute},
};

fn intent_body(token: Option<&str>) -> Value {
    let mut body = json!({
        "userId": 1,
        "machineId": 1,
        "items": [{ "productId": 1, "quantity": 2 }],
        "declaredTotal": "1.00"
    });
    if let Some(token) = token {
        body["token"] = json!(token);
    }
    body
}

#[actix_web::test]
async fn submit_intent() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/orders/intent", intent_body(Some("TEMP_9")), configure_publish).await.expect("Request failed");
    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: IntentAccepted = serde_json::from_str(&body).unwrap();
    assert_eq!(accepted, IntentAccepted { token: "TEMP_9".into(), topic: "order/intent/TEMP_9".into() });
}

#[actix_web::test]
async fn submit_intent_without_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/orders/intent", intent_body(None), configure_publish).await.expect("Request failed");
    assert_eq!(status, StatusCode::ACCEPTED);
    let accepted: IntentAccepted = serde_json::from_str(&body).unwrap();
    assert!(accepted.token.starts_with("TEMP_"));
    assert_eq!(accepted.topic, format!("order/intent/{}", accepted.token));
}

#[actix_web::test]
async fn submit_intent_with_numeric_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) =
        post_request("/orders/intent", intent_body(Some("12345")), configure_publish).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("could be mistaken for an order id"), "{body}");
}

#[actix_web::test]
async fn submit_intent_broker_down() {
    let _ = env_logger::try_init().ok();
    let (status, body) = post_request("/orders/intent", intent_body(Some("TEMP_9")), |cfg| {
        let mut publisher = MockPublisher::new();
        publisher.expect_publish().returning(|_, _| Err(PublishError::NotConnected("connection refused".into())));
        configure_with(cfg, publisher)
    })
    .await
    .expect("Request failed");
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body,
        r#"{"error":"The message broker is not available. The broker connection is not available. connection refused"}"#
    );
}

#[actix_web::test]
async fn fetch_intent_status() {
    let _ = env_logger::try_init().ok();
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().withf(|topic, _| topic.starts_with("order/outcome/")).times(2).returning(|_, _| Ok(()));
    let pipeline = test_pipeline(publisher);
    pipeline.reconcile(intent("TEMP_1", 2)).await.unwrap();
    pipeline.reconcile(intent("TEMP_2", 6)).await.unwrap_err();
    let data = web::Data::new(pipeline);

    let configure = |data: web::Data<TestPipeline>| {
        move |cfg: &mut ServiceConfig| {
            cfg.service(OrderIntentStatusRoute::<MemoryStore, MockPublisher>::new()).app_data(data);
        }
    };

    let (status, body) = get_request("/orders/intent/TEMP_1", configure(data.clone())).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let outcome: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome["status"], "reconciled");
    assert_eq!(outcome["token"], "TEMP_1");
    assert_eq!(outcome["order"]["total"], "6.00");

    let (status, body) = get_request("/orders/intent/TEMP_2", configure(data.clone())).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let outcome: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome["status"], "rejected");
    assert_eq!(outcome["reason"]["kind"], "insufficient_stock");

    let (status, _) = get_request("/orders/intent/TEMP_3", configure(data.clone())).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_request("/orders/intent/42", configure(data)).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn intent(token: &str, quantity: i64) -> OrderIntent {
    OrderIntent {
        token: token.parse().unwrap(),
        user_id: UserId(1),
        machine_id: MachineId(1),
        lines: vec![OrderLine::new(ProductId(1), quantity)],
        submitted_at: Utc::now(),
        declared_total: None,
    }
}

fn configure_publish(cfg: &mut ServiceConfig) {
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .withf(|topic, payload| {
            let payload = serde_json::from_slice::<IntentPayload>(payload).unwrap();
            topic.starts_with("order/intent/TEMP_") &&
                payload.user_id == UserId(1) &&
                payload.items.len() == 1 &&
                payload.total_amount.is_some()
        })
        .times(0..=1)
        .returning(|_, _| Ok(()));
    configure_with(cfg, publisher)
}

fn configure_with(cfg: &mut ServiceConfig, publisher: MockPublisher) {
    let pipeline = test_pipeline(publisher);
    cfg.service(SubmitOrderIntentRoute::<MemoryStore, MockPublisher>::new()).app_data(web::Data::new(pipeline));
}
