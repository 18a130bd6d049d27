use std::{sync::Arc, time::Duration};

use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Utc;
use vending_engine::{
    events::EventHandlers,
    memory::MemoryStore,
    vm_types::{MachineId, OrderIntent, OrderLine, ProductId, UserId},
    PipelineConfig,
    RejectReason,
    VendingPipeline,
};

use super::{
    helpers::{get_request, ingest, seeded_store, test_pipeline, TestPipeline},
    mocks::MockPublisher,
};
use crate::{
    routes::StatsRoute,
    stats::{stats_hooks, OutcomeStats, StatsSnapshot},
};

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

fn outcome_publisher(count: usize) -> MockPublisher {
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().withf(|topic, _| topic.starts_with("order/outcome/")).times(count).returning(|_, _| Ok(()));
    publisher
}

#[actix_web::test]
async fn fetch_stats() {
    let _ = env_logger::try_init().ok();
    let pipeline = test_pipeline(outcome_publisher(1));
    let now = Utc::now();
    ingest(&pipeline, "device/VM-01/heartbeat", "{}", now);
    ingest(&pipeline, "device/VM-02/heartbeat", "{}", now);
    ingest(&pipeline, "weather/today", "sunny", now);
    pipeline.reconcile(intent("TEMP_1", 1)).await.unwrap();

    let stats = OutcomeStats::default();
    stats.record_reconciled();
    stats.record_rejected(&RejectReason::EmptyOrder);

    let pipeline = web::Data::new(pipeline);
    let stats = web::Data::new(stats);
    let (status, body) = get_request("/stats", configure(pipeline, stats)).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let snapshot: StatsSnapshot = serde_json::from_str(&body).unwrap();
    assert_eq!(snapshot.orders_reconciled, 1);
    assert_eq!(snapshot.orders_rejected.get("empty_order"), Some(&1));
    assert_eq!(snapshot.tracked_tokens, 1);
    assert_eq!(snapshot.dropped_messages, 1);
    assert_eq!(snapshot.devices, 2);
}

#[actix_web::test]
async fn hooks_feed_the_stats() {
    let _ = env_logger::try_init().ok();
    let stats = Arc::new(OutcomeStats::default());
    let handlers = EventHandlers::new(5, stats_hooks(Arc::clone(&stats)));
    let producers = handlers.producers();
    handlers.start_handlers();
    let pipeline = VendingPipeline::new(PipelineConfig::default(), seeded_store(), Arc::new(outcome_publisher(3)), producers)
        .expect("Default topics are valid");

    pipeline.reconcile(intent("TEMP_1", 2)).await.unwrap();
    pipeline.reconcile(intent("TEMP_2", 9)).await.unwrap_err();
    // A duplicate resolves from the cache and must not be counted twice
    pipeline.reconcile(intent("TEMP_1", 2)).await.unwrap();

    for _ in 0..40 {
        if stats.reconciled() == 1 && !stats.rejected().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(stats.reconciled(), 1);
    assert_eq!(stats.rejected().get("insufficient_stock"), Some(&1));

    let (status, body) =
        get_request("/stats", configure(web::Data::new(pipeline), web::Data::from(stats))).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let snapshot: StatsSnapshot = serde_json::from_str(&body).unwrap();
    assert_eq!(snapshot.orders_reconciled, 1);
    assert_eq!(snapshot.tracked_tokens, 2);
    assert_eq!(snapshot.devices, 0);
}

fn configure(
    pipeline: web::Data<TestPipeline>,
    stats: web::Data<OutcomeStats>,
) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        cfg.service(StatsRoute::<MemoryStore, MockPublisher>::new()).app_data(pipeline).app_data(stats);
    }
}
