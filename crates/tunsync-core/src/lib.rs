// # tunsync-core
//
// Core library for the container-driven tunnel sync system.
//
// ## Architecture Overview
//
// This library provides the reconciliation engine that keeps external DNS
// records and a tunnel's ingress routing table in step with the running
// containers on a host:
//
// - **RemoteGateway**: Trait for DNS record CRUD and route table read/replace
// - **EventSource**: Trait for the container snapshot and lifecycle stream
// - **intent**: Normalizes declarative container labels into a typed intent
// - **cache**: In-process mirrors of the remote DNS and routing state
// - **SyncEngine**: Orchestrates the event -> intent -> remote delta flow
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Engine logic is separate from collaborators
// 2. **Event-Driven**: One ordered lifecycle stream drives all mutations
// 3. **Minimal Writes**: Cached state suppresses redundant remote calls
// 4. **Library-First**: The engine is fully testable with substituted
//    gateway and event source implementations

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod traits;

// Re-export core types for convenience
pub use cache::routes::RouteEffect;
pub use cache::{DnsRecordCache, RouteTable};
pub use config::SyncConfig;
pub use engine::{DnsEffect, SyncEngine};
pub use error::{Error, Result};
pub use intent::{IntentSource, RouteIntent, derive_intent};
pub use traits::{
    ContainerEvent, ContainerSnapshot, DnsRecord, DnsRecordFields, EventSource, IngressRule,
    LifecycleAction, PublishedPort, RemoteGateway,
};
