// # Event Source Trait
//
// Defines the interface to the container runtime: a snapshot of what is
// currently running, and an infinite stream of lifecycle events.
//
// ## Implementations
//
// - Docker Engine API: `tunsync-events-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use tunsync_core::EventSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* EventSource implementation */;
//
//     // Converge against what is already running
//     let running = source.running_containers().await?;
//
//     // Then follow lifecycle events
//     let mut stream = source.subscribe();
//     while let Some(event) = stream.next().await {
//         println!("container event: {:?}", event);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use tokio_stream::Stream;

/// Container lifecycle actions the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    /// Container started
    Start,
    /// Container stopped or died
    Stop,
    /// Any other runtime action; ignored by the engine
    Other,
}

/// A published port of a running container
///
/// Order matters: both the ports and the host bindings are kept in the
/// order the runtime lists them, because label normalization picks the
/// last-listed host port of the last-listed port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    /// Port inside the container
    pub container_port: u16,
    /// Host ports bound to it (may be empty for expose-only ports)
    pub host_ports: Vec<u16>,
}

/// Snapshot of one running container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSnapshot {
    /// Runtime container id
    pub id: String,
    /// Container name, without any runtime path prefix
    pub name: String,
    /// Raw container labels
    pub labels: HashMap<String, String>,
    /// Published ports, in runtime listing order
    pub ports: Vec<PublishedPort>,
}

/// One container lifecycle event
///
/// Carries only what the runtime attaches to the event itself: name and
/// labels, but no live port data. Stop events in particular cannot see the
/// (already gone) port map, which is why intent derivation has a separate
/// event-shaped input.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerEvent {
    /// Lifecycle action
    pub action: LifecycleAction,
    /// Runtime container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Labels as attached to the event
    pub labels: HashMap<String, String>,
}

/// Trait for event source implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// List the currently running containers
    ///
    /// Used once at startup so the engine can converge remote state against
    /// everything that is already up.
    async fn running_containers(&self) -> Result<Vec<ContainerSnapshot>, crate::Error>;

    /// Subscribe to container lifecycle events
    ///
    /// Returns a lazy, infinite stream. The stream is not restartable: if
    /// it ends, the caller must treat the subscription as lost and rebuild
    /// the world from scratch.
    ///
    /// # Behavior
    ///
    /// - Must yield events in runtime arrival order
    /// - Must be cancellation-safe (dropping the stream cleans up resources)
    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = ContainerEvent> + Send + 'static>>;
}
