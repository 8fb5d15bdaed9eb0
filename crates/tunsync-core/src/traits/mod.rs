//! Collaborator traits and their payload types
//!
//! The engine talks to the outside world through exactly two boundaries:
//! the remote gateway (DNS + route table provider API) and the event source
//! (container runtime). Both are substitutable for testing.

pub mod event_source;
pub mod remote_gateway;

pub use event_source::{
    ContainerEvent, ContainerSnapshot, EventSource, LifecycleAction, PublishedPort,
};
pub use remote_gateway::{DnsRecord, DnsRecordFields, IngressRule, RemoteGateway};
