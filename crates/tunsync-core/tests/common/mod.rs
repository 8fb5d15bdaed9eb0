//! Test doubles and common utilities for engine contract tests
//!
//! `MockRemoteGateway` models the remote system (records, route table,
//! per-operation call counters, injectable failures) behind shared state so
//! a clone handed to the engine can be inspected from the test.
//! `ScriptedEventSource` lets tests feed lifecycle events on demand.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tunsync_core::error::Result;
use tunsync_core::traits::{
    ContainerEvent, ContainerSnapshot, DnsRecord, DnsRecordFields, EventSource, IngressRule,
    LifecycleAction, PublishedPort, RemoteGateway,
};
use tunsync_core::{SyncConfig, SyncEngine};

/// Canonical target the mock tunnel resolves to
pub const MOCK_TARGET: &str = "testtunnel.cfargotunnel.com";

#[derive(Default)]
struct MockRemoteState {
    records: Vec<DnsRecord>,
    route_table: Vec<IngressRule>,
    next_id: usize,
    clock: i64,
    fail_next: Option<&'static str>,

    find_calls: usize,
    list_calls: usize,
    create_calls: usize,
    update_calls: usize,
    delete_calls: usize,
    fetch_calls: usize,
    replace_calls: usize,
}

impl MockRemoteState {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        DateTime::<Utc>::from_timestamp(1_700_000_000 + self.clock, 0).unwrap()
    }

    fn take_failure(&mut self, operation: &'static str) -> Result<()> {
        if self.fail_next == Some(operation) {
            self.fail_next = None;
            return Err(tunsync_core::Error::gateway(operation, "injected failure"));
        }
        Ok(())
    }
}

/// A mock RemoteGateway with shared, inspectable state
#[derive(Clone)]
pub struct MockRemoteGateway {
    inner: Arc<Mutex<MockRemoteState>>,
}

impl MockRemoteGateway {
    /// Create a mock whose remote route table starts as `route_table`
    pub fn new(route_table: Vec<IngressRule>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockRemoteState {
                route_table,
                ..Default::default()
            })),
        }
    }

    /// Seed a remote record that the engine has never observed
    pub fn seed_record(&self, fqdn: &str, content: &str) -> DnsRecord {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let stamp = state.next_timestamp();
        let record = DnsRecord {
            id: format!("rec-{}", state.next_id),
            name: fqdn.to_string(),
            content: content.to_string(),
            proxied: true,
            ttl: 1,
            modified_on: stamp,
        };
        state.records.push(record.clone());
        record
    }

    /// Simulate an external actor touching a record (bumps `modified_on`)
    pub fn bump_record(&self, fqdn: &str) {
        let mut state = self.inner.lock().unwrap();
        let stamp = state.next_timestamp();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.name == fqdn)
            .expect("record to bump exists");
        record.modified_on = stamp;
    }

    /// Make the next call to `operation` fail once
    pub fn fail_next(&self, operation: &'static str) {
        self.inner.lock().unwrap().fail_next = Some(operation);
    }

    /// Remote records as the mock currently knows them
    pub fn remote_records(&self) -> Vec<DnsRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    /// The route table as last replaced (or seeded)
    pub fn route_table(&self) -> Vec<IngressRule> {
        self.inner.lock().unwrap().route_table.clone()
    }

    pub fn find_calls(&self) -> usize {
        self.inner.lock().unwrap().find_calls
    }

    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }

    pub fn update_calls(&self) -> usize {
        self.inner.lock().unwrap().update_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.inner.lock().unwrap().delete_calls
    }

    pub fn replace_calls(&self) -> usize {
        self.inner.lock().unwrap().replace_calls
    }
}

#[async_trait::async_trait]
impl RemoteGateway for MockRemoteGateway {
    async fn find_dns_record(&self, fqdn: &str) -> Result<Option<DnsRecord>> {
        let mut state = self.inner.lock().unwrap();
        state.find_calls += 1;
        state.take_failure("find_dns_record")?;
        Ok(state.records.iter().find(|r| r.name == fqdn).cloned())
    }

    async fn list_dns_records(&self) -> Result<Vec<DnsRecord>> {
        let mut state = self.inner.lock().unwrap();
        state.list_calls += 1;
        state.take_failure("list_dns_records")?;
        Ok(state.records.clone())
    }

    async fn create_dns_record(&self, fields: &DnsRecordFields) -> Result<DnsRecord> {
        let mut state = self.inner.lock().unwrap();
        state.create_calls += 1;
        state.take_failure("create_dns_record")?;
        state.next_id += 1;
        let stamp = state.next_timestamp();
        let record = DnsRecord {
            id: format!("rec-{}", state.next_id),
            name: fields.name.clone(),
            content: fields.content.clone(),
            proxied: fields.proxied,
            ttl: fields.ttl,
            modified_on: stamp,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update_dns_record(&self, id: &str, fields: &DnsRecordFields) -> Result<DnsRecord> {
        let mut state = self.inner.lock().unwrap();
        state.update_calls += 1;
        state.take_failure("update_dns_record")?;
        let stamp = state.next_timestamp();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| tunsync_core::Error::gateway("update_dns_record", "no such record"))?;
        record.name = fields.name.clone();
        record.content = fields.content.clone();
        record.proxied = fields.proxied;
        record.ttl = fields.ttl;
        record.modified_on = stamp;
        Ok(record.clone())
    }

    async fn delete_dns_record(&self, id: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.delete_calls += 1;
        state.take_failure("delete_dns_record")?;
        let before = state.records.len();
        state.records.retain(|r| r.id != id);
        if state.records.len() == before {
            return Err(tunsync_core::Error::gateway(
                "delete_dns_record",
                "no such record",
            ));
        }
        Ok(())
    }

    async fn fetch_route_table(&self) -> Result<Vec<IngressRule>> {
        let mut state = self.inner.lock().unwrap();
        state.fetch_calls += 1;
        state.take_failure("fetch_route_table")?;
        Ok(state.route_table.clone())
    }

    async fn replace_route_table(&self, rules: &[IngressRule]) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.replace_calls += 1;
        state.take_failure("replace_route_table")?;
        state.route_table = rules.to_vec();
        Ok(())
    }

    fn canonical_target(&self) -> String {
        MOCK_TARGET.to_string()
    }

    fn gateway_name(&self) -> &'static str {
        "mock"
    }
}

/// An EventSource that serves a fixed snapshot and test-fed events
pub struct ScriptedEventSource {
    containers: Vec<ContainerSnapshot>,
    stream_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ContainerEvent>>>>,
}

impl ScriptedEventSource {
    /// Create a source with the given running containers
    ///
    /// Returns the source plus a sender the test uses to feed events.
    pub fn new(
        containers: Vec<ContainerSnapshot>,
    ) -> (Self, mpsc::UnboundedSender<ContainerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            containers,
            stream_rx: Arc::new(Mutex::new(Some(rx))),
        };
        (source, tx)
    }
}

#[async_trait::async_trait]
impl EventSource for ScriptedEventSource {
    async fn running_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        Ok(self.containers.clone())
    }

    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = ContainerEvent> + Send + 'static>> {
        let rx = self
            .stream_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// A one-rule catch-all route table, the minimal valid remote shape
pub fn catch_all_rules() -> Vec<IngressRule> {
    vec![IngressRule::catch_all("http_status:404")]
}

/// Helper to build a labeled container snapshot
pub fn snapshot(
    name: &str,
    labels: &[(&str, &str)],
    ports: &[(u16, &[u16])],
) -> ContainerSnapshot {
    ContainerSnapshot {
        id: format!("{name}-id"),
        name: name.to_string(),
        labels: label_map(labels),
        ports: ports
            .iter()
            .map(|(container_port, host_ports)| PublishedPort {
                container_port: *container_port,
                host_ports: host_ports.to_vec(),
            })
            .collect(),
    }
}

/// Helper to build a start event
pub fn start_event(name: &str, labels: &[(&str, &str)]) -> ContainerEvent {
    event(name, LifecycleAction::Start, labels)
}

/// Helper to build a stop event
pub fn stop_event(name: &str, labels: &[(&str, &str)]) -> ContainerEvent {
    event(name, LifecycleAction::Stop, labels)
}

/// Helper to build an arbitrary lifecycle event
pub fn event(name: &str, action: LifecycleAction, labels: &[(&str, &str)]) -> ContainerEvent {
    ContainerEvent {
        action,
        id: format!("{name}-id"),
        name: name.to_string(),
        labels: label_map(labels),
    }
}

fn label_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Helper to create a minimal SyncConfig for testing
pub fn test_config() -> SyncConfig {
    SyncConfig {
        api_token: "test-token-1234567890".to_string(),
        account_id: "test-account".to_string(),
        zone_id: "test-zone".to_string(),
        tunnel_token: "test-tunnel-token".to_string(),
        domain: "example.com".to_string(),
        origin_host: "localhost".to_string(),
    }
}

/// Helper to build an engine over the shared mock gateway
///
/// The returned engine has already hydrated both caches.
pub async fn hydrated_engine(
    gateway: &MockRemoteGateway,
    containers: Vec<ContainerSnapshot>,
) -> SyncEngine {
    let (source, _tx) = ScriptedEventSource::new(containers);
    let mut engine = SyncEngine::new(
        Box::new(gateway.clone()),
        Box::new(source),
        &test_config(),
    )
    .expect("engine construction succeeds");
    engine.hydrate().await.expect("hydration succeeds");
    engine
}
