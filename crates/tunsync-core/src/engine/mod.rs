//! Core reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Deriving a routing intent from each container snapshot or event
//! - Computing the minimal DNS delta against cached and remote state
//! - Maintaining the in-memory route table and publishing it wholesale
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ EventSource  │─── ContainerEvent ───┐
//! └──────────────┘                      │
//!                                       ▼
//!                              ┌──────────────┐
//!                              │  SyncEngine  │
//!                              └──────────────┘
//!                                       │
//!          ┌────────────────────────────┼────────────────────────────┐
//!          │                            │                            │
//!          ▼                            ▼                            ▼
//! ┌────────────────┐          ┌────────────────┐          ┌────────────────┐
//! │ DnsRecordCache │          │   RouteTable   │          │ RemoteGateway  │
//! │ (drift check)  │          │ (rule deltas)  │          │ (CRUD/publish) │
//! └────────────────┘          └────────────────┘          └────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Lifecycle event arrives (or a snapshot during startup convergence)
//! 2. Labels are normalized into a [`RouteIntent`]
//! 3. DNS path: authoritative lookup, then create/update/delete as needed
//! 4. Route path: mutate the in-memory table only
//! 5. Publish: replace the remote route table with the full cached list
//!
//! Events are processed strictly one at a time, to completion, in arrival
//! order. The engine owns both caches exclusively, so no locking is needed,
//! and it never retries: failures propagate to the per-event handler, which
//! logs and drops that single event (startup failures abort the run).

use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::cache::routes::RouteEffect;
use crate::cache::{DnsRecordCache, RouteTable};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::intent::{DEFAULT_BACKEND_PORT, IntentSource, RouteIntent, derive_intent};
use crate::traits::{
    ContainerEvent, DnsRecordFields, EventSource, LifecycleAction, RemoteGateway,
};

/// Effect of one DNS reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsEffect {
    /// A record was created
    Created,
    /// An existing record was updated
    Updated,
    /// An existing record was deleted
    Deleted,
    /// Nothing to do; remote state already matched
    Unchanged,
}

/// Core reconciliation engine
///
/// Owns the DNS record cache and the route table, and drives all remote
/// mutations through the gateway. Constructed once at startup; `run()`
/// hydrates the caches, converges against the running containers and then
/// follows the lifecycle stream until shutdown.
///
/// ## Threading
///
/// The engine runs on a single logical thread of control; events are
/// consumed and reconciled strictly sequentially, which guarantees that
/// remote mutations happen in event arrival order.
pub struct SyncEngine {
    /// Remote gateway for DNS and route table operations
    gateway: Box<dyn RemoteGateway>,

    /// Container runtime boundary
    events: Box<dyn EventSource>,

    /// Last observed remote DNS records, by logical name
    dns_cache: DnsRecordCache,

    /// Mirror of the remote ingress rule list; `None` until hydrated
    routes: Option<RouteTable>,

    /// Base domain suffix for every logical name
    domain: String,

    /// Host the published services are reachable on
    origin_host: String,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `gateway`: Remote gateway implementation
    /// - `events`: Event source implementation
    /// - `config`: Sync configuration (validated here)
    pub fn new(
        gateway: Box<dyn RemoteGateway>,
        events: Box<dyn EventSource>,
        config: &SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            gateway,
            events,
            dns_cache: DnsRecordCache::new(),
            routes: None,
            domain: config.domain.clone(),
            origin_host: config.origin_host.clone(),
        })
    }

    /// Run the engine
    ///
    /// Hydrates the caches, converges against the currently running
    /// containers and then processes lifecycle events until a shutdown
    /// signal is received.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Startup failed or the event stream was lost; the
    ///   caller is expected to rebuild the whole engine
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Internal run implementation that accepts an optional shutdown signal
    async fn run_internal(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.hydrate().await?;
        self.converge().await?;

        info!("watching container lifecycle events");
        let mut events = self.events.subscribe();

        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for provided shutdown signal
            loop {
                tokio::select! {
                    maybe_event = events.next() => match maybe_event {
                        Some(event) => self.handle_event(&event).await,
                        None => return Err(Error::event_source("lifecycle event stream ended")),
                    },

                    _ = &mut rx => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            // Production mode: wait for SIGINT
            loop {
                tokio::select! {
                    maybe_event = events.next() => match maybe_event {
                        Some(event) => self.handle_event(&event).await,
                        None => return Err(Error::event_source("lifecycle event stream ended")),
                    },

                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Populate both caches from the remote gateway
    ///
    /// Fetches the full zone record list (keyed by stripped subdomain) and
    /// the tunnel route table, validating the table's catch-all shape.
    pub async fn hydrate(&mut self) -> Result<()> {
        let records = self.gateway.list_dns_records().await?;
        let cached = self.dns_cache.hydrate(records, &self.domain);
        info!(records = cached, "cached DNS records");

        let rules = self.gateway.fetch_route_table().await?;
        let table = RouteTable::from_rules(rules)?;
        info!(rules = table.rules().len(), "cached tunnel route table");
        self.routes = Some(table);

        Ok(())
    }

    /// Converge remote state against the currently running containers
    ///
    /// Replays the per-container reconciliation for every running container
    /// (with `enabled` taken from its live label flag), then publishes the
    /// route table once. Any failure aborts the whole startup sequence.
    pub async fn converge(&mut self) -> Result<()> {
        let containers = self.events.running_containers().await?;
        info!(containers = containers.len(), "converging running containers");

        for snapshot in &containers {
            let Some(intent) = derive_intent(IntentSource::Container(snapshot)) else {
                debug!(container = %snapshot.name, "no routing labels, skipping");
                continue;
            };
            self.reconcile_dns(&intent).await?;
            self.reconcile_route(&intent)?;
        }

        self.publish_routes().await
    }

    /// Apply one container lifecycle event
    ///
    /// Start events take `enabled` from the label flag; stop events force it
    /// off. Containers without routing labels are invisible and produce no
    /// remote traffic at all. Each applied event ends with a route table
    /// publish.
    pub async fn apply_event(&mut self, event: &ContainerEvent) -> Result<()> {
        match event.action {
            LifecycleAction::Start | LifecycleAction::Stop => {}
            LifecycleAction::Other => {
                debug!(container = %event.name, "ignoring lifecycle action");
                return Ok(());
            }
        }

        let Some(intent) = derive_intent(IntentSource::Event(event)) else {
            debug!(container = %event.name, "no routing labels in event, skipping");
            return Ok(());
        };

        info!(
            container = %event.name,
            action = ?event.action,
            name = %intent.name,
            "processing container event"
        );

        let dns = self.reconcile_dns(&intent).await?;
        let route = self.reconcile_route(&intent)?;
        debug!(?dns, ?route, name = %intent.name, "reconciled");

        self.publish_routes().await
    }

    /// Reconcile the DNS record for one intent
    ///
    /// The existence check goes to the gateway, not the cache: a cache miss
    /// does not imply remote absence. The cache only decides whether an
    /// existing remote record still matches the last observation (by its
    /// `modified_on` timestamp) so redundant writes can be skipped.
    pub async fn reconcile_dns(&mut self, intent: &RouteIntent) -> Result<DnsEffect> {
        let fqdn = self.fqdn(&intent.name);
        let remote = self.gateway.find_dns_record(&fqdn).await?;

        if !intent.enabled {
            let effect = match remote {
                Some(record) => {
                    info!(record = %fqdn, "deleting DNS record");
                    self.gateway.delete_dns_record(&record.id).await?;
                    DnsEffect::Deleted
                }
                None => DnsEffect::Unchanged,
            };
            self.dns_cache.remove(&intent.name);
            return Ok(effect);
        }

        let fields = DnsRecordFields {
            name: fqdn.clone(),
            content: self.gateway.canonical_target(),
            proxied: intent.proxied,
            ttl: intent.ttl,
        };

        match remote {
            None => {
                info!(record = %fqdn, "creating DNS record");
                let created = self.gateway.create_dns_record(&fields).await?;
                self.dns_cache.insert(&intent.name, created);
                Ok(DnsEffect::Created)
            }
            Some(remote_record) => {
                let last_seen = self.dns_cache.get(&intent.name).map(|r| r.modified_on);
                if last_seen == Some(remote_record.modified_on) {
                    debug!(record = %fqdn, "DNS record unchanged since last observation");
                    return Ok(DnsEffect::Unchanged);
                }

                info!(record = %fqdn, "updating DNS record");
                let updated = self
                    .gateway
                    .update_dns_record(&remote_record.id, &fields)
                    .await?;
                self.dns_cache.insert(&intent.name, updated);
                Ok(DnsEffect::Updated)
            }
        }
    }

    /// Reconcile the route table entry for one intent
    ///
    /// Mutates the in-memory table only; the remote sees nothing until
    /// [`publish_routes`](Self::publish_routes). Errors if the table was
    /// never hydrated.
    pub fn reconcile_route(&mut self, intent: &RouteIntent) -> Result<RouteEffect> {
        let hostname = self.fqdn(&intent.name);
        let service = format!(
            "http://{}:{}",
            self.origin_host,
            intent.port.unwrap_or(DEFAULT_BACKEND_PORT)
        );

        let table = self
            .routes
            .as_mut()
            .ok_or_else(|| Error::route_table("route table has not been fetched"))?;

        let effect = if intent.enabled {
            table.upsert(&hostname, &service)
        } else if table.remove(&hostname) {
            RouteEffect::Removed
        } else {
            RouteEffect::Unchanged
        };

        match effect {
            RouteEffect::Inserted => info!(rule = %hostname, %service, "added ingress rule"),
            RouteEffect::Replaced => info!(rule = %hostname, %service, "replaced ingress rule"),
            RouteEffect::Removed => info!(rule = %hostname, "removed ingress rule"),
            RouteEffect::Unchanged => debug!(rule = %hostname, "ingress rule unchanged"),
        }

        Ok(effect)
    }

    /// Push the cached route table to the remote gateway wholesale
    ///
    /// A no-op (logged, not an error) if the table was never hydrated.
    pub async fn publish_routes(&mut self) -> Result<()> {
        let Some(table) = &self.routes else {
            warn!("route table never fetched, nothing to publish");
            return Ok(());
        };

        debug!(rules = table.rules().len(), "publishing route table");
        self.gateway.replace_route_table(table.rules()).await
    }

    /// Handle one event inside the run loop
    ///
    /// A failure is logged and the event dropped; processing continues with
    /// the next event.
    async fn handle_event(&mut self, event: &ContainerEvent) {
        if let Err(e) = self.apply_event(event).await {
            error!(
                container = %event.name,
                error = %e,
                "event reconciliation failed, dropping event"
            );
        }
    }

    fn fqdn(&self, logical: &str) -> String {
        format!("{logical}.{}", self.domain)
    }

    /// Test-only helper to run the engine with a controlled shutdown signal
    ///
    /// **TESTING ONLY**: Contract tests require deterministic termination.
    /// Production code should use [`run()`](Self::run) instead, which shuts
    /// down on OS signals.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }
}
