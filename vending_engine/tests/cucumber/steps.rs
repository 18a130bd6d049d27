use std::time::Duration;

use chrono::Utc;
use cucumber::{then, when};
use vending_engine::{
    vm_types::{BrokerMessage, LogCategory, MachineCode, Money, OrderIntent, OrderLine},
    AccountManagement,
    CatalogManagement,
    TokenStatus,
};

use crate::cucumber::{world::scenario_time, VendingWorld};

//----------------------------------------------   Order intents  ----------------------------------------------------
async fn submit(world: &mut VendingWorld, user: String, token: String, lines: Vec<(i64, String)>, declared: Option<Money>) {
    let system = world.system();
    let intent = OrderIntent {
        token: token.parse().expect("Invalid correlation token"),
        user_id: system.user(&user),
        machine_id: system.machine("VM-01"),
        lines: lines.into_iter().map(|(qty, p)| OrderLine::new(system.product(&p), qty)).collect(),
        submitted_at: Utc::now(),
        declared_total: declared,
    };
    system.pipeline.submit_order_intent(&intent).await.expect("Error submitting intent");
    system.flush_broker().await;
}

#[when(expr = "'{word}' submits intent {word} for {int} of product '{word}'")]
async fn submit_intent(world: &mut VendingWorld, user: String, token: String, qty: i64, product: String) {
    submit(world, user, token, vec![(qty, product)], None).await;
}

#[when(expr = "'{word}' submits intent {word} for {int} of product '{word}' declaring a total of {word}")]
async fn submit_intent_with_total(
    world: &mut VendingWorld,
    user: String,
    token: String,
    qty: i64,
    product: String,
    declared: Money,
) {
    submit(world, user, token, vec![(qty, product)], Some(declared)).await;
}

#[when(expr = "'{word}' submits intent {word} for {int} of product '{word}' and {int} of product '{word}'")]
async fn submit_two_line_intent(
    world: &mut VendingWorld,
    user: String,
    token: String,
    qty1: i64,
    product1: String,
    qty2: i64,
    product2: String,
) {
    submit(world, user, token, vec![(qty1, product1), (qty2, product2)], None).await;
}

#[when(expr = "user '{word}' tops up to a balance of {word}")]
async fn top_up(world: &mut VendingWorld, user: String, balance: Money) {
    let system = world.system();
    let user = system.user(&user);
    system.pipeline.db().set_balance(user, balance).await.expect("Error setting balance");
}

#[then(expr = "intent {word} is reconciled with a total of {word}")]
async fn check_reconciled(world: &mut VendingWorld, token: String, total: Money) {
    let order = world.system().last_resolution(&token).clone().expect("Intent was rejected");
    assert_eq!(order.total, total, "Order total is incorrect");
}

#[then(expr = "intent {word} is rejected with {word}")]
async fn check_rejected(world: &mut VendingWorld, token: String, label: String) {
    let reason = world.system().last_resolution(&token).clone().expect_err("Intent was reconciled");
    assert_eq!(reason.label(), label, "Rejection reason is incorrect");
}

#[then(expr = "every resolution of intent {word} names the same order")]
async fn check_same_order(world: &mut VendingWorld, token: String) {
    let system = world.system();
    let resolutions = system.resolutions.get(&token).expect("Intent has not been resolved");
    assert!(resolutions.len() > 1, "Intent was only resolved once");
    let first = resolutions[0].as_ref().expect("Intent was rejected");
    for r in resolutions {
        assert_eq!(r.as_ref().expect("Intent was rejected").order_id, first.order_id, "Order ids differ");
    }
}

#[then(expr = "the engine reports intent {word} as resolved")]
async fn check_status(world: &mut VendingWorld, token: String) {
    let status = world.system().pipeline.order_status(&token.parse().unwrap());
    assert!(matches!(status, TokenStatus::Resolved(_)), "Status is {status:?}");
}

#[then(expr = "{int} outcome(s) for intent {word} have been logged")]
async fn check_outcomes_logged(world: &mut VendingWorld, count: usize, token: String) {
    let system = world.system();
    let entries = system.pipeline.log(LogCategory::Outcome, 0, None);
    let n = entries.iter().filter(|e| e.topic.ends_with(&format!("/{token}"))).count();
    assert_eq!(n, count, "Outcome count is incorrect");
}

#[then(expr = "the store holds {int} order(s)")]
async fn check_order_count(world: &mut VendingWorld, count: i64) {
    let n = world.system().pipeline.db().count_orders().await.expect("Error counting orders");
    assert_eq!(n, count, "Order count is incorrect");
}

#[then(expr = "machine '{word}' has {int} of product '{word}'")]
async fn check_stock(world: &mut VendingWorld, code: String, stock: i64, product: String) {
    let system = world.system();
    let (machine, product) = (system.machine(&code), system.product(&product));
    let actual = system.pipeline.db().fetch_stock(machine, product).await.expect("Error fetching stock");
    assert_eq!(actual, Some(stock), "Stock is incorrect");
}

#[then(expr = "user '{word}' has a balance of {word}")]
async fn check_balance(world: &mut VendingWorld, user: String, balance: Money) {
    let system = world.system();
    let user = system.user(&user);
    let actual = system.pipeline.db().fetch_balance(user).await.expect("Error fetching balance");
    assert_eq!(actual, Some(balance), "Balance is incorrect");
}

//----------------------------------------------   Device messages  --------------------------------------------------
#[when(expr = "a message arrives on '{word}' at {int}s with payload {string}")]
async fn message_arrives(world: &mut VendingWorld, topic: String, secs: i64, payload: String) {
    let msg = BrokerMessage::new(topic, payload, scenario_time(secs));
    world.system().deliver(msg).await;
}

#[when(expr = "'{word}' sends a heartbeat at {int}s")]
async fn heartbeat(world: &mut VendingWorld, code: String, secs: i64) {
    let msg = BrokerMessage::new(format!("device/{code}/heartbeat"), "{}", scenario_time(secs));
    world.system().deliver(msg).await;
}

#[when(expr = "'{word}' reports status {word} at {int}°C at {int}s")]
async fn state_report(world: &mut VendingWorld, code: String, status: String, temp: i64, secs: i64) {
    let payload = format!(r#"{{"machineId":"{code}","status":"{status}","temperature":{temp},"alerts":"无"}}"#);
    let msg = BrokerMessage::new(format!("device/{code}/state"), payload, scenario_time(secs));
    world.system().deliver(msg).await;
}

#[when(expr = "the machine '{word}' is removed")]
async fn remove_machine(world: &mut VendingWorld, code: String) {
    let code = code.parse::<MachineCode>().expect("Invalid machine code");
    world.system().pipeline.evict_device(&code);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut VendingWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "at {int}s the snapshot shows '{word}' as {word}")]
async fn check_liveness(world: &mut VendingWorld, secs: i64, code: String, liveness: String) {
    let snapshot = world.system().pipeline.device_snapshot(scenario_time(secs));
    let view = snapshot.iter().find(|v| v.record.machine_code.as_str() == code).expect("Device is not in the snapshot");
    match liveness.as_str() {
        "live" => assert!(view.is_live, "{code} should be live"),
        "not-live" => assert!(!view.is_live, "{code} should not be live"),
        _ => panic!("Unknown liveness {liveness}"),
    }
}

#[then(expr = "the snapshot shows '{word}' with status {word}")]
async fn check_device_status(world: &mut VendingWorld, code: String, status: String) {
    let code = code.parse::<MachineCode>().expect("Invalid machine code");
    let view = world.system().pipeline.registry().get(&code, Utc::now()).expect("Device is not in the snapshot");
    let actual = view.record.status.map(|s| s.name().to_string()).unwrap_or_default();
    assert_eq!(actual, status, "Status is incorrect");
}

#[then(expr = "the snapshot has {int} device(s)")]
async fn check_device_count(world: &mut VendingWorld, count: usize) {
    assert_eq!(world.system().pipeline.device_snapshot(Utc::now()).len(), count, "Device count is incorrect");
}

//----------------------------------------------   Logs  -------------------------------------------------------------
#[then(expr = "the {word} log has {int} entry/entries since {int}s")]
async fn check_log(world: &mut VendingWorld, category: LogCategory, count: usize, secs: i64) {
    let since = scenario_time(secs).timestamp_millis();
    let entries = world.system().pipeline.log(category, since, None);
    assert_eq!(entries.len(), count, "Log entry count is incorrect");
    assert!(entries.iter().all(|e| e.timestamp > since), "Entries at or before the cutoff were returned");
    assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq), "Entries are out of order");
}

#[then(expr = "{int} message(s) has/have been dropped")]
async fn check_dropped(world: &mut VendingWorld, count: u64) {
    assert_eq!(world.system().pipeline.dropped_messages(), count, "Dropped count is incorrect");
}
