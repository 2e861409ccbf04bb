// # Cloudflare DNS Provider
//
// DnsProvider implementation for the Cloudflare API v4.
//
// ## Behaviour
//
// - One logical API operation per trait call; lookups follow pagination
// - Every non-success status maps to `Error::Http` with the status attached,
//   so the engine can classify it as retryable or not
// - A response with `success: false` is a failure even on HTTP 200
// - The `proxied` flag of an existing record survives updates unless the
//   record metadata or the provider config sets it
// - Dry-run mode performs lookups but only logs mutations
// - No retries, no caching, no background tasks
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - Zone Details: GET `/zones/:zone_id`

use async_trait::async_trait;
use ipfailover_core::config::{ProviderConfig, RecordType};
use ipfailover_core::traits::{DesiredRecord, DnsProvider, DnsProviderFactory, ObservedRecord};
use ipfailover_core::{Error, ProviderRegistry, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for record lookups
const PER_PAGE: u32 = 100;

/// Metadata key carrying the proxy flag
pub const PROXIED_KEY: &str = "proxied";

/// Envelope around every Cloudflare response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

/// Body of create and update requests
#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
}

impl DnsRecord {
    fn into_observed(self) -> Result<ObservedRecord> {
        let record_type = self.record_type.parse::<RecordType>()?;
        Ok(ObservedRecord {
            id: self.id,
            name: self.name,
            record_type,
            value: self.content,
            ttl: self.ttl,
            metadata: BTreeMap::from([(PROXIED_KEY.to_string(), self.proxied.to_string())]),
        })
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests
/// - Log the intended POST/PUT/DELETE payload
/// - **NOT** modify any DNS record
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    api_token: String,
    zone_id: String,
    /// Proxy flag forced on every record this provider writes
    proxied: Option<bool>,
    base_url: String,
    client: reqwest::Client,
    dry_run: bool,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("proxied", &self.proxied)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// Fails if the token or zone is empty, or the HTTP client cannot be
    /// built.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        proxied: Option<bool>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare zone_id cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_token,
            zone_id,
            proxied,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at another API root (mock servers in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.records_url(), id)
    }

    /// Proxy flag to send: record metadata, then provider config, then
    /// whatever the existing record had.
    fn proxied_for(&self, desired: &DesiredRecord, existing: Option<&ObservedRecord>) -> Option<bool> {
        let parse = |m: &BTreeMap<String, String>| m.get(PROXIED_KEY).and_then(|v| v.parse::<bool>().ok());

        parse(&desired.metadata)
            .or(self.proxied)
            .or_else(|| existing.and_then(|e| parse(&e.metadata)))
    }

    /// Send a request and unwrap the Cloudflare envelope
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        action: &str,
    ) -> Result<ApiResponse<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::transport(format!("Cloudflare {action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            let message = match status.as_u16() {
                401 | 403 => {
                    "Authentication failed: invalid API token or insufficient permissions".to_string()
                }
                404 => format!("{action}: not found"),
                409 => "Conflict: record is being modified by another process".to_string(),
                429 => "Rate limit exceeded".to_string(),
                500..=599 => format!("Cloudflare server error (transient): {error_text}"),
                _ => format!("{action} failed: {error_text}"),
            };
            return Err(Error::http(status.as_u16(), url, message));
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::transport(format!("Failed to parse Cloudflare response: {e}")))?;

        if !body.success {
            let errors = body
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::http(
                status.as_u16(),
                url,
                format!("Cloudflare API error: {errors}"),
            ));
        }

        Ok(body)
    }

    async fn write_record(
        &self,
        method: reqwest::Method,
        url: &str,
        payload: &RecordPayload<'_>,
        action: &str,
    ) -> Result<ObservedRecord> {
        let body: ApiResponse<DnsRecord> = self
            .call(self.client.request(method, url).json(payload), url, action)
            .await?;

        body.result
            .ok_or_else(|| Error::transport(format!("Cloudflare {action}: response has no result")))?
            .into_observed()
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &str {
        "cloudflare"
    }

    async fn get_record(&self, name: &str, record_type: RecordType) -> Result<Option<ObservedRecord>> {
        tracing::debug!("Looking up Cloudflare record: {} (type: {})", name, record_type);

        let url = self.records_url();
        let mut page = 1u32;

        loop {
            let request = self.client.get(&url).query(&[
                ("name", name.to_string()),
                ("type", record_type.to_string()),
                ("page", page.to_string()),
                ("per_page", PER_PAGE.to_string()),
            ]);
            let body: ApiResponse<Vec<DnsRecord>> = self.call(request, &url, "record lookup").await?;

            let total_pages = body.result_info.as_ref().map_or(1, |info| info.total_pages);
            let records = body.result.unwrap_or_default();
            let fetched = records.len();

            if let Some(found) = records
                .into_iter()
                .find(|r| r.name.eq_ignore_ascii_case(name) && r.record_type == record_type.as_str())
            {
                tracing::debug!("Found record ID: {}", found.id);
                return found.into_observed().map(Some);
            }

            if fetched < PER_PAGE as usize || page >= total_pages {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn create_record(&self, desired: &DesiredRecord) -> Result<ObservedRecord> {
        let payload = RecordPayload {
            record_type: desired.record_type.as_str(),
            name: &desired.name,
            content: &desired.value,
            ttl: desired.ttl,
            proxied: self.proxied_for(desired, None),
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would POST {} with payload: {}",
                self.records_url(),
                serde_json::to_string(&payload).unwrap_or_default()
            );
            return Ok(ObservedRecord {
                id: "dry-run".to_string(),
                name: desired.name.clone(),
                record_type: desired.record_type,
                value: desired.value.clone(),
                ttl: desired.ttl,
                metadata: desired.metadata.clone(),
            });
        }

        let url = self.records_url();
        let created = self
            .write_record(reqwest::Method::POST, &url, &payload, "record create")
            .await?;
        tracing::info!("Cloudflare record created: {} -> {}", created.name, created.value);
        Ok(created)
    }

    async fn update_record(&self, existing: &ObservedRecord, desired: &DesiredRecord) -> Result<ObservedRecord> {
        let payload = RecordPayload {
            record_type: desired.record_type.as_str(),
            name: &desired.name,
            content: &desired.value,
            ttl: desired.ttl,
            proxied: self.proxied_for(desired, Some(existing)),
        };
        let url = self.record_url(&existing.id);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would PUT {} with payload: {} (was: {})",
                url,
                serde_json::to_string(&payload).unwrap_or_default(),
                existing.value
            );
            return Ok(ObservedRecord {
                value: desired.value.clone(),
                ttl: desired.ttl,
                metadata: existing.carry_over(desired),
                ..existing.clone()
            });
        }

        let updated = self
            .write_record(reqwest::Method::PUT, &url, &payload, "record update")
            .await?;
        tracing::info!(
            "Cloudflare record updated: {} -> {} (was: {})",
            updated.name,
            updated.value,
            existing.value
        );
        Ok(updated)
    }

    async fn delete_record(&self, existing: &ObservedRecord) -> Result<()> {
        let url = self.record_url(&existing.id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would DELETE {}", url);
            return Ok(());
        }

        let _: ApiResponse<serde_json::Value> = self
            .call(self.client.delete(&url), &url, "record delete")
            .await?;
        tracing::info!("Cloudflare record deleted: {} ({})", existing.name, existing.id);
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        let url = format!("{}/zones/{}", self.base_url, self.zone_id);
        let _: ApiResponse<serde_json::Value> = self.call(self.client.get(&url), &url, "zone lookup").await?;
        tracing::info!(
            "Cloudflare zone {} accessible [mode: {}]",
            self.zone_id,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );
        Ok(())
    }
}

/// Factory for creating Cloudflare providers
#[derive(Debug, Default, Clone, Copy)]
pub struct CloudflareFactory {
    pub dry_run: bool,
}

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                proxied,
            } => {
                if self.dry_run {
                    tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
                }
                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    zone_id.clone(),
                    *proxied,
                    self.dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ipfailover_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// ipfailover_provider_cloudflare::register(&mut registry, false);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &mut ProviderRegistry, dry_run: bool) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory { dry_run }));
}
