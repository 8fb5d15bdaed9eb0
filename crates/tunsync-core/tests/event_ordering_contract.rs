//! Contract tests: event ordering and the run loop
//!
//! Events are processed strictly one at a time in arrival order, so later
//! events for the same logical name always observe the effects of earlier
//! ones. A failing event is logged and dropped; the loop keeps going.

mod common;

use common::*;
use tokio::time::{Duration, sleep};
use tunsync_core::SyncEngine;
use tunsync_core::traits::LifecycleAction;

const ENABLED: &[(&str, &str)] = &[("cloudflare.enabled", "true"), ("cloudflare.port", "8080")];

async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

fn spawn_engine(
    gateway: &MockRemoteGateway,
    source: ScriptedEventSource,
) -> (
    tokio::task::JoinHandle<tunsync_core::Result<()>>,
    tokio::sync::oneshot::Sender<()>,
) {
    let mut engine = SyncEngine::new(
        Box::new(gateway.clone()),
        Box::new(source),
        &test_config(),
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });
    (handle, shutdown_tx)
}

#[tokio::test]
async fn start_then_stop_ends_absent() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;

    event_tx.send(start_event("web1", ENABLED)).unwrap();
    settle().await;

    // The record and rule exist between the two events
    assert_eq!(gateway.remote_records().len(), 1);
    assert_eq!(gateway.route_table().len(), 2);

    event_tx.send(stop_event("web1", ENABLED)).unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(gateway.remote_records().is_empty());
    let table = gateway.route_table();
    assert_eq!(table, catch_all_rules(), "only the catch-all survives");
    // One publish per applied event
    assert_eq!(gateway.replace_calls(), 3); // startup + 2 events
}

#[tokio::test]
async fn stop_then_start_ends_present_with_start_attributes() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;

    // Stop for a name with no prior state, then a start
    event_tx.send(stop_event("web1", ENABLED)).unwrap();
    event_tx.send(start_event("web1", ENABLED)).unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let records = gateway.remote_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "web1.example.com");
    assert_eq!(records[0].content, MOCK_TARGET);

    let table = gateway.route_table();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].hostname.as_deref(), Some("web1.example.com"));
    assert_eq!(table[0].service, "http://localhost:8080");
}

#[tokio::test]
async fn unlabeled_containers_are_invisible() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;
    let startup_publishes = gateway.replace_calls();

    event_tx
        .send(start_event("plain", &[("com.example.build", "42")]))
        .unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(gateway.find_calls(), 0);
    assert_eq!(gateway.create_calls(), 0);
    assert_eq!(gateway.replace_calls(), startup_publishes, "no publish either");
}

#[tokio::test]
async fn started_container_with_flag_off_is_not_force_enabled() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;

    event_tx
        .send(start_event("web1", &[("cloudflare.enabled", "false")]))
        .unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(gateway.remote_records().is_empty());
    assert_eq!(gateway.create_calls(), 0);
    assert_eq!(gateway.route_table(), catch_all_rules());
}

#[tokio::test]
async fn other_lifecycle_actions_are_ignored() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;

    event_tx
        .send(event("web1", LifecycleAction::Other, ENABLED))
        .unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(gateway.find_calls(), 0);
    assert!(gateway.remote_records().is_empty());
}

#[tokio::test]
async fn failed_event_is_dropped_and_processing_continues() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;

    gateway.fail_next("create_dns_record");

    event_tx.send(start_event("web1", ENABLED)).unwrap();
    event_tx.send(start_event("web2", ENABLED)).unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // web1 failed and was dropped; web2 went through untouched
    let records = gateway.remote_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "web2.example.com");
}

#[tokio::test]
async fn quick_stop_start_cycle_converges_to_present() {
    let gateway = MockRemoteGateway::new(catch_all_rules());
    let (source, event_tx) = ScriptedEventSource::new(Vec::new());
    let (handle, shutdown_tx) = spawn_engine(&gateway, source);
    settle().await;

    // A restart burst: the final state must match the last event
    event_tx.send(start_event("web1", ENABLED)).unwrap();
    event_tx.send(stop_event("web1", ENABLED)).unwrap();
    event_tx.send(start_event("web1", ENABLED)).unwrap();
    settle().await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(gateway.remote_records().len(), 1);
    let table = gateway.route_table();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].hostname.as_deref(), Some("web1.example.com"));
}
