// # DNS Provider Trait
//
// Defines the primitive record operations every DNS vendor integration
// exposes. The find-then-create-or-update protocol built on top of them
// lives in `crate::reconciler`.
//
// ## Implementations
//
// - Cloudflare: `ipfailover-provider-cloudflare` crate
// - Hetzner: `ipfailover-provider-hetzner` crate
//
// ## Usage
//
// ```rust,ignore
// use ipfailover_core::reconciler;
//
// let desired = record_config.desired("203.0.113.10");
// reconciler::reconcile(provider.as_ref(), &desired).await?;
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::config::{ProviderConfig, RecordConfig, RecordType};

/// The record state a reconciliation converges towards
///
/// Built fresh every cycle from configuration and the decided target;
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    /// Fully qualified record name
    pub name: String,
    pub record_type: RecordType,
    /// Record content (the target address for A/AAAA)
    pub value: String,
    pub ttl: u32,
    /// Provider type name this record belongs to
    pub provider: String,
    /// Provider-specific attributes to set
    pub metadata: BTreeMap<String, String>,
}

impl RecordConfig {
    /// Desired state of this record pointing at `value`
    pub fn desired(&self, value: impl Into<String>) -> DesiredRecord {
        DesiredRecord {
            name: self.name.clone(),
            record_type: self.record_type,
            value: value.into(),
            ttl: self.ttl,
            provider: self.provider.type_name().to_string(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A record as the provider currently holds it
///
/// Only valid for the duration of one reconciliation; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRecord {
    /// Provider-assigned opaque identifier
    pub id: String,
    pub name: String,
    pub record_type: RecordType,
    pub value: String,
    pub ttl: u32,
    /// Provider-specific attributes (routing policy, proxy flag, ...)
    pub metadata: BTreeMap<String, String>,
}

impl ObservedRecord {
    /// Attributes to send on update: everything already on the record,
    /// overridden by whatever the desired record sets explicitly.
    pub fn carry_over(&self, desired: &DesiredRecord) -> BTreeMap<String, String> {
        let mut merged = self.metadata.clone();
        merged.extend(desired.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// Providers are isolated integrations:
///
/// - Perform HTTP/HTTPS calls to their own API only
/// - One logical API operation per method call
/// - No retries or backoff; a failed record is retried on the next cycle
/// - No background tasks
/// - No caching of records between calls
/// - No access to the state store or to other providers
///
/// The engine bounds every call with a deadline and may drop the future at
/// any await point.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Provider name (for logging and metrics), e.g. "cloudflare"
    fn name(&self) -> &str;

    /// Find the record with exactly this name and type
    ///
    /// Returns `Ok(None)` when no such record exists. Never widens the
    /// search to other types.
    async fn get_record(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<ObservedRecord>, crate::Error>;

    /// Create a new record
    async fn create_record(&self, desired: &DesiredRecord) -> Result<ObservedRecord, crate::Error>;

    /// Update `existing` in place to match `desired`
    ///
    /// Attributes present on `existing` that `desired` does not set must be
    /// preserved (see [`ObservedRecord::carry_over`]).
    async fn update_record(
        &self,
        existing: &ObservedRecord,
        desired: &DesiredRecord,
    ) -> Result<ObservedRecord, crate::Error>;

    /// Delete a record previously returned by [`DnsProvider::get_record`]
    async fn delete_record(&self, existing: &ObservedRecord) -> Result<(), crate::Error>;

    /// Check credentials and zone access; called once at startup
    async fn validate(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_over_keeps_unowned_attributes() {
        let existing = ObservedRecord {
            id: "r1".into(),
            name: "app.example.com".into(),
            record_type: RecordType::A,
            value: "10.0.0.1".into(),
            ttl: 300,
            metadata: BTreeMap::from([
                ("set_identifier".to_string(), "eu".to_string()),
                ("weight".to_string(), "10".to_string()),
            ]),
        };
        let desired = DesiredRecord {
            name: "app.example.com".into(),
            record_type: RecordType::A,
            value: "10.0.0.2".into(),
            ttl: 60,
            provider: "test".into(),
            metadata: BTreeMap::from([("weight".to_string(), "20".to_string())]),
        };

        let merged = existing.carry_over(&desired);
        assert_eq!(merged["set_identifier"], "eu");
        assert_eq!(merged["weight"], "20");
    }
}
