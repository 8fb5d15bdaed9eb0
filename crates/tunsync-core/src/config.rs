//! Configuration types for the tunnel sync system
//!
//! All settings the engine and its collaborators need; the daemon fills this
//! from environment variables. Validation happens once at startup and any
//! missing required setting is fatal.

use serde::{Deserialize, Serialize};

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// API token for the DNS/tunnel provider
    pub api_token: String,

    /// Provider account identifier
    pub account_id: String,

    /// DNS zone identifier
    pub zone_id: String,

    /// Tunnel identity token (carries the tunnel id)
    pub tunnel_token: String,

    /// Base domain suffix appended to every logical name
    pub domain: String,

    /// Host the published services are reachable on
    #[serde(default = "default_origin_host")]
    pub origin_host: String,
}

impl SyncConfig {
    /// Validate the configuration
    ///
    /// Checks required field presence and that the base domain is a valid
    /// DNS name. Returns `Error::Config` on the first violation.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_token.is_empty() {
            return Err(crate::Error::config("API token cannot be empty"));
        }
        if self.account_id.is_empty() {
            return Err(crate::Error::config("account id cannot be empty"));
        }
        if self.zone_id.is_empty() {
            return Err(crate::Error::config("zone id cannot be empty"));
        }
        if self.tunnel_token.is_empty() {
            return Err(crate::Error::config("tunnel token cannot be empty"));
        }
        if self.origin_host.is_empty() {
            return Err(crate::Error::config("origin host cannot be empty"));
        }

        validate_domain_name(&self.domain)?;

        Ok(())
    }
}

/// Validate that a string is a valid DNS domain name
///
/// Basic validation per RFC 1035; not comprehensive but catches the common
/// misconfigurations (empty labels, overlong names, bad characters).
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    if domain.is_empty() {
        return Err(crate::Error::config("domain cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "domain name too long: {} chars (max 253)",
            domain.len()
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "domain name has empty label: '{domain}'"
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "domain label too long: {} chars (max 63). Label: '{label}'",
                label.len()
            )));
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return Err(crate::Error::config(format!(
                "domain label contains invalid characters. Label: '{label}'"
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "domain label cannot start or end with hyphen. Label: '{label}'"
            )));
        }
    }

    Ok(())
}

fn default_origin_host() -> String {
    "localhost".to_string()
}
