// # Hetzner DNS Provider
//
// DnsProvider implementation for the Hetzner DNS API (v1).
//
// Authentication is the `Auth-API-Token` header. The API has no server-side
// filter by name, so lookups list the zone and match name and type exactly.
// Status codes map to `Error::Http`; nothing is retried here.
//
// ## API Reference
//
// - List Records: GET `/records?zone_id=...`
// - Create Record: POST `/records` (201 Created)
// - Update Record: PUT `/records/:id`
// - Delete Record: DELETE `/records/:id`
// - Zone Details: GET `/zones/:id`

use async_trait::async_trait;
use ipfailover_core::config::{ProviderConfig, RecordType};
use ipfailover_core::traits::{DesiredRecord, DnsProvider, DnsProviderFactory, ObservedRecord};
use ipfailover_core::{Error, ProviderRegistry, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Hetzner DNS API base URL
pub const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const AUTH_HEADER: &str = "Auth-API-Token";

/// Metadata key carrying the zone of an observed record
pub const ZONE_ID_KEY: &str = "zone_id";

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<HetznerRecord>,
}

#[derive(Debug, Deserialize)]
struct SingleRecord {
    record: HetznerRecord,
}

#[derive(Debug, Deserialize)]
struct HetznerRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    value: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    zone_id: String,
}

#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    value: &'a str,
    ttl: u32,
    zone_id: &'a str,
}

impl HetznerRecord {
    fn into_observed(self) -> Result<ObservedRecord> {
        Ok(ObservedRecord {
            record_type: self.record_type.parse()?,
            id: self.id,
            name: self.name,
            value: self.value,
            ttl: self.ttl.unwrap_or_default(),
            metadata: BTreeMap::from([(ZONE_ID_KEY.to_string(), self.zone_id)]),
        })
    }
}

/// Hetzner DNS provider
pub struct HetznerProvider {
    api_token: String,
    zone_id: String,
    base_url: String,
    client: reqwest::Client,
    dry_run: bool,
}

impl std::fmt::Debug for HetznerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl HetznerProvider {
    pub fn new(api_token: impl Into<String>, zone_id: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Hetzner API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Hetzner zone_id cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_token,
            zone_id,
            base_url: HETZNER_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        action: &str,
    ) -> Result<T> {
        let response = request
            .header(AUTH_HEADER, &self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::transport(format!("Hetzner {action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            let message = match status.as_u16() {
                401 | 403 => "Authentication failed: invalid API token".to_string(),
                404 => format!("{action}: not found"),
                422 => format!("{action} rejected: {error_text}"),
                429 => "Rate limit exceeded".to_string(),
                500..=599 => format!("Hetzner server error (transient): {error_text}"),
                _ => format!("{action} failed: {error_text}"),
            };
            return Err(Error::http(status.as_u16(), url, message));
        }

        response
            .json()
            .await
            .map_err(|e| Error::transport(format!("Failed to parse Hetzner response: {e}")))
    }

    fn payload<'a>(&'a self, desired: &'a DesiredRecord) -> RecordPayload<'a> {
        RecordPayload {
            record_type: desired.record_type.as_str(),
            name: &desired.name,
            value: &desired.value,
            ttl: desired.ttl,
            zone_id: &self.zone_id,
        }
    }
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    fn name(&self) -> &str {
        "hetzner"
    }

    async fn get_record(&self, name: &str, record_type: RecordType) -> Result<Option<ObservedRecord>> {
        let url = self.url("/records");
        let request = self.client.get(&url).query(&[("zone_id", self.zone_id.as_str())]);
        let list: RecordList = self.call(request, &url, "record list").await?;

        list.records
            .into_iter()
            .find(|r| r.name == name && r.record_type == record_type.as_str())
            .map(HetznerRecord::into_observed)
            .transpose()
    }

    async fn create_record(&self, desired: &DesiredRecord) -> Result<ObservedRecord> {
        let url = self.url("/records");
        let payload = self.payload(desired);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would POST {} for {} -> {}",
                url,
                desired.name,
                desired.value
            );
            return Ok(ObservedRecord {
                id: "dry-run".to_string(),
                name: desired.name.clone(),
                record_type: desired.record_type,
                value: desired.value.clone(),
                ttl: desired.ttl,
                metadata: BTreeMap::from([(ZONE_ID_KEY.to_string(), self.zone_id.clone())]),
            });
        }

        let created: SingleRecord = self
            .call(self.client.post(&url).json(&payload), &url, "record create")
            .await?;
        tracing::info!("Hetzner record created: {} -> {}", desired.name, desired.value);
        created.record.into_observed()
    }

    async fn update_record(&self, existing: &ObservedRecord, desired: &DesiredRecord) -> Result<ObservedRecord> {
        let url = self.url(&format!("/records/{}", existing.id));
        let payload = self.payload(desired);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would PUT {} for {} -> {} (was: {})",
                url,
                desired.name,
                desired.value,
                existing.value
            );
            return Ok(ObservedRecord {
                value: desired.value.clone(),
                ttl: desired.ttl,
                metadata: existing.carry_over(desired),
                ..existing.clone()
            });
        }

        let updated: SingleRecord = self
            .call(self.client.put(&url).json(&payload), &url, "record update")
            .await?;
        tracing::info!(
            "Hetzner record updated: {} -> {} (was: {})",
            desired.name,
            desired.value,
            existing.value
        );
        updated.record.into_observed()
    }

    async fn delete_record(&self, existing: &ObservedRecord) -> Result<()> {
        let url = self.url(&format!("/records/{}", existing.id));

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would DELETE {}", url);
            return Ok(());
        }

        let response = self
            .client
            .delete(&url)
            .header(AUTH_HEADER, &self.api_token)
            .send()
            .await
            .map_err(|e| Error::transport(format!("Hetzner record delete: {e}")))?;

        // Empty body on success
        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(
                status.as_u16(),
                &url,
                format!("record delete failed: {}", response.text().await.unwrap_or_default()),
            ));
        }

        tracing::info!("Hetzner record deleted: {} ({})", existing.name, existing.id);
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        let url = self.url(&format!("/zones/{}", self.zone_id));
        let _: serde_json::Value = self.call(self.client.get(&url), &url, "zone lookup").await?;
        tracing::info!("Hetzner zone {} accessible", self.zone_id);
        Ok(())
    }
}

/// Factory for creating Hetzner providers
#[derive(Debug, Default, Clone, Copy)]
pub struct HetznerFactory {
    pub dry_run: bool,
}

impl DnsProviderFactory for HetznerFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Hetzner { api_token, zone_id } => Ok(Box::new(HetznerProvider::new(
                api_token.clone(),
                zone_id.clone(),
                self.dry_run,
            )?)),
            _ => Err(Error::config("Invalid config for Hetzner provider")),
        }
    }
}

/// Register the Hetzner provider with a registry
pub fn register(registry: &mut ProviderRegistry, dry_run: bool) {
    registry.register_provider("hetzner", Box::new(HetznerFactory { dry_run }));
}
