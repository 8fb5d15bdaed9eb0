//! In-process mirrors of the remote state
//!
//! Both caches are owned exclusively by the engine and mutated on its single
//! thread of control, so neither needs interior locking. They live for the
//! process lifetime only: a restart re-derives everything from the gateway.

pub mod dns;
pub mod routes;

pub use dns::DnsRecordCache;
pub use routes::RouteTable;
