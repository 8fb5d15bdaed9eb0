//! Label normalization
//!
//! Containers declare their routing intent through labels under the
//! `cloudflare.` namespace. This module collapses the two raw shapes that
//! intent can arrive in (a live container snapshot, or the attributes of a
//! lifecycle event) into one typed record the engine reconciles against.
//!
//! A container with zero namespaced labels is invisible: it produces no
//! intent and the engine never touches it. Labels that are present but
//! unusable (an unparseable `port` or `ttl`) also produce no intent; a
//! half-applied record would be worse than none.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::traits::{ContainerEvent, ContainerSnapshot, LifecycleAction};

/// Label namespace prefix that marks a container as managed
pub const LABEL_NAMESPACE: &str = "cloudflare.";

/// Backend port assumed when no port label and no port map is available
pub const DEFAULT_BACKEND_PORT: u16 = 80;

/// Default record TTL (1 = automatic on Cloudflare)
const DEFAULT_TTL: u32 = 1;

/// Normalized desired state for one logical service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteIntent {
    /// Logical name (the subdomain, without the base domain suffix)
    pub name: String,
    /// Whether a record and route should exist at all
    pub enabled: bool,
    /// Backend port; `None` falls back to [`DEFAULT_BACKEND_PORT`] at use
    pub port: Option<u16>,
    /// Whether the DNS record is proxied
    pub proxied: bool,
    /// DNS record TTL
    pub ttl: u32,
}

/// The two raw shapes intent can be derived from
///
/// Stop events carry no live port map, so the event variant substitutes a
/// fixed default port; the intent still has to be well-formed to drive
/// deletion.
#[derive(Debug, Clone, Copy)]
pub enum IntentSource<'a> {
    /// A live container snapshot (startup convergence, start events could
    /// use it too if the caller has one)
    Container(&'a ContainerSnapshot),
    /// Lifecycle event attributes only
    Event(&'a ContainerEvent),
}

/// Derive the routing intent for one container, if it has any
///
/// Returns `None` when the container carries no namespaced labels at all,
/// or when the labels it carries are unusable.
///
/// The `enabled` flag is strict: only a literal (case-insensitive) `true`
/// enables; absent or malformed values disable. A stop event forces
/// `enabled = false` regardless of the stored flag, because the record for
/// a stopped container must not exist no matter what its labels say.
pub fn derive_intent(source: IntentSource<'_>) -> Option<RouteIntent> {
    let (labels, fallback_name) = match source {
        IntentSource::Container(c) => (&c.labels, c.name.as_str()),
        IntentSource::Event(e) => (&e.labels, e.name.as_str()),
    };

    let scoped: HashMap<&str, &str> = labels
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(LABEL_NAMESPACE)
                .map(|stripped| (stripped, value.as_str()))
        })
        .collect();

    if scoped.is_empty() {
        return None;
    }

    let flag = scoped
        .get("enabled")
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));
    let enabled = match source {
        IntentSource::Event(event) if event.action == LifecycleAction::Stop => false,
        _ => flag,
    };

    let name = match scoped.get("subdomain").filter(|s| !s.is_empty()) {
        Some(subdomain) => subdomain.to_string(),
        None => fallback_name.to_string(),
    };
    if name.is_empty() {
        warn!("container has routing labels but no subdomain and no name, skipping");
        return None;
    }

    let port = match scoped.get("port") {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                warn!(container = fallback_name, port = *raw, "unusable port label, skipping");
                return None;
            }
        },
        None => match source {
            IntentSource::Container(c) => last_published_host_port(c),
            IntentSource::Event(_) => Some(DEFAULT_BACKEND_PORT),
        },
    };

    let proxied = match scoped.get("proxied") {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => true,
    };

    let ttl = match scoped.get("ttl") {
        Some(raw) => match raw.parse::<u32>() {
            Ok(ttl) => ttl,
            Err(_) => {
                warn!(container = fallback_name, ttl = *raw, "unusable ttl label, skipping");
                return None;
            }
        },
        None => DEFAULT_TTL,
    };

    let intent = RouteIntent {
        name,
        enabled,
        port,
        proxied,
        ttl,
    };
    debug!(?intent, container = fallback_name, "derived intent");
    Some(intent)
}

/// The last-listed host port of the last-listed published port, if any
fn last_published_host_port(snapshot: &ContainerSnapshot) -> Option<u16> {
    snapshot
        .ports
        .last()
        .and_then(|port| port.host_ports.last().copied())
}
