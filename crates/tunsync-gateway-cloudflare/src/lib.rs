// # Cloudflare Remote Gateway
//
// This crate implements the `RemoteGateway` trait against the Cloudflare
// API v4: CNAME record CRUD in one zone, plus read/replace of a tunnel's
// ingress configuration.
//
// ## Responsibility boundary
//
// - Makes single-shot HTTP calls and propagates every failure to the engine
// - NO retry or backoff logic (failure policy is owned by the engine's
//   caller)
// - NO caching (the engine owns both caches)
// - NO background tasks
//
// ## Security
//
// - The API token NEVER appears in logs
// - The `Debug` implementation redacts the token
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=CNAME&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Edit DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - Tunnel configuration:
//   GET/PUT `/accounts/:account_id/cfd_tunnel/:tunnel_id/configurations`

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tunsync_core::traits::{DnsRecord, DnsRecordFields, IngressRule, RemoteGateway};
use tunsync_core::{Error, Result};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Comment attached to every record this gateway writes
const MANAGED_COMMENT: &str = "managed via tunsync";

/// Record type this gateway manages (tunnel targets are always CNAMEs)
const RECORD_TYPE: &str = "CNAME";

/// Cloudflare remote gateway
///
/// One instance per (zone, tunnel) pair. Stateless apart from the HTTP
/// client: every call goes to the API and every failure is returned to the
/// engine.
pub struct CloudflareGateway {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Account the tunnel belongs to
    account_id: String,

    /// Zone the managed records live in
    zone_id: String,

    /// Tunnel id, extracted from the tunnel token
    tunnel_id: String,

    /// API base URL (overridable for tests)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareGateway")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("zone_id", &self.zone_id)
            .field("tunnel_id", &self.tunnel_id)
            .finish()
    }
}

/// Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Payload of the base64 tunnel token
#[derive(Debug, Deserialize)]
struct TunnelToken {
    #[serde(rename = "t")]
    tunnel_id: String,
}

#[derive(Debug, Deserialize)]
struct TunnelConfiguration {
    #[serde(default)]
    config: Option<TunnelConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TunnelConfig {
    #[serde(default)]
    ingress: Vec<IngressRule>,
}

impl CloudflareGateway {
    /// Create a new Cloudflare gateway
    ///
    /// # Parameters
    ///
    /// - `api_token`: API token with DNS edit and tunnel configuration
    ///   permissions
    /// - `account_id`: Account the tunnel belongs to
    /// - `zone_id`: Zone the managed records live in
    /// - `tunnel_token`: Tunnel identity token; the tunnel id is extracted
    ///   from it here
    ///
    /// # Errors
    ///
    /// `Error::Config` when any input is empty or the tunnel token does not
    /// decode to a tunnel id.
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        zone_id: impl Into<String>,
        tunnel_token: &str,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let tunnel_id = tunnel_id_from_token(tunnel_token)?;

        // Build HTTP client with timeout
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_token,
            account_id: account_id.into(),
            zone_id: zone_id.into(),
            tunnel_id,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
        })
    }

    /// Override the API base URL (for tests against a local mock server)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into();
        self
    }

    /// The tunnel id extracted from the tunnel token
    pub fn tunnel_id(&self) -> &str {
        &self.tunnel_id
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn configurations_url(&self) -> String {
        format!(
            "{}/accounts/{}/cfd_tunnel/{}/configurations",
            self.base_url, self.account_id, self.tunnel_id
        )
    }

    /// Check status and unwrap the v4 envelope into its result
    async fn parse<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(map_status(operation, status, &body));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| Error::gateway(operation, format!("failed to parse response: {e}")))?;

        if !envelope.success {
            return Err(Error::gateway(operation, describe_errors(&envelope.errors)));
        }

        envelope
            .result
            .ok_or_else(|| Error::gateway(operation, "response carried no result"))
    }

    /// Like `parse`, for calls whose result payload is irrelevant
    async fn check(&self, operation: &'static str, response: reqwest::Response) -> Result<()> {
        self.parse::<serde_json::Value>(operation, response)
            .await
            .map(|_| ())
    }

    fn record_body(&self, fields: &DnsRecordFields) -> serde_json::Value {
        serde_json::json!({
            "type": RECORD_TYPE,
            "name": fields.name,
            "content": fields.content,
            "proxied": fields.proxied,
            "ttl": fields.ttl,
            "comment": MANAGED_COMMENT,
        })
    }
}

#[async_trait]
impl RemoteGateway for CloudflareGateway {
    /// Look up a record by exact name
    ///
    /// Uses the list endpoint with a `name` filter; Cloudflare returns at
    /// most one CNAME per exact name, so the first match is the record.
    async fn find_dns_record(&self, fqdn: &str) -> Result<Option<DnsRecord>> {
        let operation = "find DNS record";
        tracing::debug!(record = fqdn, "looking up DNS record");

        let response = self
            .client
            .get(self.records_url())
            .query(&[("type", RECORD_TYPE), ("name", fqdn)])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        let records: Vec<DnsRecord> = self.parse(operation, response).await?;
        Ok(records.into_iter().next())
    }

    async fn list_dns_records(&self) -> Result<Vec<DnsRecord>> {
        let operation = "list DNS records";

        let response = self
            .client
            .get(self.records_url())
            .query(&[("type", RECORD_TYPE), ("per_page", "500")])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        self.parse(operation, response).await
    }

    async fn create_dns_record(&self, fields: &DnsRecordFields) -> Result<DnsRecord> {
        let operation = "create DNS record";
        tracing::info!(record = %fields.name, "creating DNS record");

        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&self.record_body(fields))
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        self.parse(operation, response).await
    }

    async fn update_dns_record(&self, id: &str, fields: &DnsRecordFields) -> Result<DnsRecord> {
        let operation = "update DNS record";
        tracing::info!(record = %fields.name, "updating DNS record");

        let response = self
            .client
            .patch(format!("{}/{id}", self.records_url()))
            .bearer_auth(&self.api_token)
            .json(&self.record_body(fields))
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        self.parse(operation, response).await
    }

    async fn delete_dns_record(&self, id: &str) -> Result<()> {
        let operation = "delete DNS record";
        tracing::info!(record_id = id, "deleting DNS record");

        let response = self
            .client
            .delete(format!("{}/{id}", self.records_url()))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        self.check(operation, response).await
    }

    async fn fetch_route_table(&self) -> Result<Vec<IngressRule>> {
        let operation = "fetch route table";
        tracing::debug!(tunnel = %self.tunnel_id, "fetching tunnel configuration");

        let response = self
            .client
            .get(self.configurations_url())
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        let configuration: TunnelConfiguration = self.parse(operation, response).await?;
        Ok(configuration.config.unwrap_or_default().ingress)
    }

    async fn replace_route_table(&self, rules: &[IngressRule]) -> Result<()> {
        let operation = "replace route table";
        tracing::info!(rules = rules.len(), "replacing tunnel ingress configuration");

        let body = serde_json::json!({ "config": { "ingress": rules } });
        let response = self
            .client
            .put(self.configurations_url())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::gateway(operation, format!("HTTP request failed: {e}")))?;

        self.check(operation, response).await
    }

    fn canonical_target(&self) -> String {
        format!("{}.cfargotunnel.com", self.tunnel_id)
    }

    fn gateway_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Extract the tunnel id from a Cloudflare tunnel token
///
/// The token is unpadded standard base64 over a JSON object whose `t` field
/// is the tunnel id.
fn tunnel_id_from_token(token: &str) -> Result<String> {
    if token.is_empty() {
        return Err(Error::config("tunnel token cannot be empty"));
    }

    let padding = (4 - token.len() % 4) % 4;
    let padded = format!("{token}{}", "=".repeat(padding));

    let decoded = BASE64
        .decode(padded)
        .map_err(|e| Error::config(format!("tunnel token is not valid base64: {e}")))?;

    let payload: TunnelToken = serde_json::from_slice(&decoded)
        .map_err(|e| Error::config(format!("tunnel token payload is not valid JSON: {e}")))?;

    if payload.tunnel_id.is_empty() {
        return Err(Error::config("tunnel token carries no tunnel id"));
    }

    Ok(payload.tunnel_id)
}

/// Map HTTP status codes to specific errors
/// (auth, rate limit, transient server errors, then everything else)
fn map_status(operation: &'static str, status: StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "invalid API token or insufficient permissions during {operation} (status {status})"
        )),
        429 => Error::rate_limited(format!(
            "Cloudflare rate limit exceeded during {operation} (status {status})"
        )),
        500..=599 => Error::gateway(
            operation,
            format!("Cloudflare server error (transient): {status} - {body}"),
        ),
        _ => Error::gateway(operation, format!("request failed: {status} - {body}")),
    }
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "API reported failure without error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}
