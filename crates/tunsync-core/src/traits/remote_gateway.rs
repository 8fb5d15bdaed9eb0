// # Remote Gateway Trait
//
// Defines the interface to the DNS/CDN/tunnel provider's API.
//
// ## Implementations
//
// - Cloudflare: `tunsync-gateway-cloudflare` crate
//
// ## Responsibility boundary
//
// Gateway implementations perform single-shot API calls and report success
// or failure. They hold no reconciliation state: what exists, what should
// exist and whether a write is needed is decided by `SyncEngine` against its
// caches. Implementations must not retry internally; a failure is returned
// to the engine, whose caller decides whether the triggering event is
// dropped or the startup sequence aborted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A DNS record as known by the remote provider
///
/// `name` is the fully-qualified name; the engine's cache keys records by
/// the logical (subdomain-only) name instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record id
    pub id: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record content (the tunnel's canonical target)
    pub content: String,
    /// Whether the record is proxied through the CDN
    pub proxied: bool,
    /// Record TTL in seconds (1 = automatic)
    pub ttl: u32,
    /// Server-side modification timestamp, used for drift detection
    pub modified_on: DateTime<Utc>,
}

/// Desired attributes for a DNS record create or update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsRecordFields {
    /// Fully-qualified record name
    pub name: String,
    /// Record content (the tunnel's canonical target)
    pub content: String,
    /// Whether the record is proxied through the CDN
    pub proxied: bool,
    /// Record TTL in seconds (1 = automatic)
    pub ttl: u32,
}

/// One rule of the tunnel's ordered ingress routing table
///
/// A rule without a hostname is a catch-all: it matches any request the
/// named rules above it did not. The remote provider requires the table to
/// end with at least one catch-all, and reconciliation must never move,
/// duplicate or remove that trailing block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Hostname this rule matches; `None` marks a catch-all rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Backend service the rule routes to (e.g. `http://localhost:8080`)
    pub service: String,
    /// Optional path matcher within the hostname
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl IngressRule {
    /// Create a named rule routing `hostname` to `service`
    pub fn named(hostname: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            service: service.into(),
            path: None,
        }
    }

    /// Create a catch-all rule (no hostname)
    pub fn catch_all(service: impl Into<String>) -> Self {
        Self {
            hostname: None,
            service: service.into(),
            path: None,
        }
    }

    /// Whether this rule is a catch-all
    pub fn is_catch_all(&self) -> bool {
        self.hostname.is_none()
    }
}

/// Trait for remote gateway implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Look up the DNS record with exactly the given fully-qualified name
    ///
    /// This is the authoritative existence check the engine performs before
    /// every create/delete decision; a cache miss never implies remote
    /// absence.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DnsRecord))`: The record exists remotely
    /// - `Ok(None)`: No record with that name
    /// - `Err(Error)`: The lookup itself failed
    async fn find_dns_record(&self, fqdn: &str) -> Result<Option<DnsRecord>, crate::Error>;

    /// List all managed-type DNS records in the zone
    ///
    /// Used once at startup to hydrate the engine's record cache.
    async fn list_dns_records(&self) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a DNS record with the given attributes
    ///
    /// # Returns
    ///
    /// The server's view of the created record, including its id and
    /// `modified_on` timestamp.
    async fn create_dns_record(&self, fields: &DnsRecordFields)
    -> Result<DnsRecord, crate::Error>;

    /// Update an existing DNS record to the given attributes
    ///
    /// # Returns
    ///
    /// The server's view of the updated record.
    async fn update_dns_record(
        &self,
        id: &str,
        fields: &DnsRecordFields,
    ) -> Result<DnsRecord, crate::Error>;

    /// Delete a DNS record by id
    async fn delete_dns_record(&self, id: &str) -> Result<(), crate::Error>;

    /// Fetch the tunnel's current ordered ingress rule list
    async fn fetch_route_table(&self) -> Result<Vec<IngressRule>, crate::Error>;

    /// Replace the tunnel's ingress rule list wholesale
    ///
    /// Last-writer-wins: any remote modification since the last fetch is
    /// overwritten.
    async fn replace_route_table(&self, rules: &[IngressRule]) -> Result<(), crate::Error>;

    /// The canonical DNS target records should point at
    /// (e.g. `<tunnel-id>.cfargotunnel.com`)
    fn canonical_target(&self) -> String;

    /// Get the gateway name (for logging/debugging)
    fn gateway_name(&self) -> &'static str;
}
