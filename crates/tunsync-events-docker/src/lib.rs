// # Docker Event Source
//
// This crate implements the `EventSource` trait over the Docker Engine API
// (via bollard, default local socket):
//
// - `running_containers()` lists what is up right now, with labels and the
//   published port map in Docker's listing order
// - `subscribe()` follows container lifecycle events, mapping `start` to
//   `Start` and `die` to `Stop`; everything else passes through as `Other`
//   for the engine to ignore
//
// Event metadata (name, labels) comes from the event actor attributes, so
// stop events work without inspecting the (already gone) container.
//
// ## Responsibility boundary
//
// This crate only observes the runtime. It makes no decisions about what an
// event means for DNS or routing; that is the engine's job. The forwarding
// task spawned by `subscribe()` ends when the receiving stream is dropped.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EventMessage, Port};
use bollard::system::EventsOptions;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use tunsync_core::traits::{
    ContainerEvent, ContainerSnapshot, EventSource, LifecycleAction, PublishedPort,
};
use tunsync_core::{Error, Result};

/// Event source backed by the local Docker daemon
pub struct DockerEventSource {
    docker: Docker,
}

impl DockerEventSource {
    /// Connect to the Docker daemon using the platform defaults
    /// (the local unix socket on Linux)
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::event_source(format!("failed to connect to Docker: {e}")))?;
        Ok(Self { docker })
    }

    /// Wrap an existing client (for alternative connection setups)
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl EventSource for DockerEventSource {
    async fn running_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        let options = ListContainersOptions::<String> {
            filters: HashMap::from([("status".to_string(), vec!["running".to_string()])]),
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::event_source(format!("failed to list containers: {e}")))?;

        debug!(containers = summaries.len(), "listed running containers");
        Ok(summaries.into_iter().map(snapshot_from_summary).collect())
    }

    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = ContainerEvent> + Send + 'static>> {
        let docker = self.docker.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        // Forwarding task: owns the Docker stream, ends when the receiver
        // is dropped or the daemon closes the stream
        tokio::spawn(async move {
            let options = EventsOptions::<String> {
                filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
                ..Default::default()
            };

            let mut events = Box::pin(docker.events(Some(options)));
            while let Some(message) = events.next().await {
                match message {
                    Ok(message) => {
                        if let Some(event) = event_from_message(message)
                            && tx.send(event).is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable Docker event");
                    }
                }
            }
            debug!("Docker event stream ended");
        });

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// Map a container listing entry to a snapshot
fn snapshot_from_summary(summary: ContainerSummary) -> ContainerSnapshot {
    let id = summary.id.unwrap_or_default();
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| short_id(&id));

    ContainerSnapshot {
        name,
        labels: summary.labels.unwrap_or_default(),
        ports: group_ports(summary.ports.unwrap_or_default()),
        id,
    }
}

/// Group the flat port listing by container port, preserving listing order
///
/// Docker lists one entry per (container port, binding); the normalizer
/// wants "the host ports of each published port" in order.
fn group_ports(ports: Vec<Port>) -> Vec<PublishedPort> {
    let mut grouped: Vec<PublishedPort> = Vec::new();
    for port in ports {
        let Ok(container_port) = u16::try_from(port.private_port) else {
            continue;
        };
        let host_port = port.public_port.and_then(|p| u16::try_from(p).ok());

        match grouped
            .iter_mut()
            .find(|group| group.container_port == container_port)
        {
            Some(group) => {
                if let Some(host_port) = host_port
                    && !group.host_ports.contains(&host_port)
                {
                    group.host_ports.push(host_port);
                }
            }
            None => grouped.push(PublishedPort {
                container_port,
                host_ports: host_port.into_iter().collect(),
            }),
        }
    }
    grouped
}

/// Map a raw event message to a lifecycle event
///
/// Returns `None` for messages without an actor; name and labels are taken
/// from the actor attributes.
fn event_from_message(message: EventMessage) -> Option<ContainerEvent> {
    let action = lifecycle_action(message.action.as_deref().unwrap_or_default());
    let actor = message.actor?;
    let id = actor.id.unwrap_or_default();
    let mut attributes = actor.attributes.unwrap_or_default();
    let name = attributes
        .remove("name")
        .unwrap_or_else(|| short_id(&id));

    Some(ContainerEvent {
        action,
        id,
        name,
        labels: attributes,
    })
}

/// Map a Docker action string to a lifecycle action
///
/// `die` (not `stop`) is the authoritative termination signal: Docker emits
/// it for every exit path, while `stop` only follows an explicit stop
/// request that `die` already covered.
fn lifecycle_action(raw: &str) -> LifecycleAction {
    match raw {
        "start" => LifecycleAction::Start,
        "die" => LifecycleAction::Stop,
        _ => LifecycleAction::Other,
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}
