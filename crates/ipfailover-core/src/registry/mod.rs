//! Plugin-based provider registry
//!
//! Provider crates register a factory under their type name; configuration
//! then selects providers by that name. The registry is an ordinary value
//! built at startup and consumed by [`ProviderRegistry::bind_records`], whose
//! output is moved into the engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = ProviderRegistry::new();
//! ipfailover_provider_cloudflare::register(&mut registry, false);
//! ipfailover_provider_hetzner::register(&mut registry, false);
//!
//! let bindings = registry.bind_records(&config.records)?;
//! ```

use crate::config::{ProviderConfig, RecordConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// A configured record together with the provider that hosts it
#[derive(Clone)]
pub struct RecordBinding {
    pub record: RecordConfig,
    pub provider: Arc<dyn DnsProvider>,
}

impl RecordBinding {
    pub fn new(record: RecordConfig, provider: Arc<dyn DnsProvider>) -> Self {
        Self { record, provider }
    }

    /// Ledger key of the bound record
    pub fn key(&self) -> String {
        self.record.key()
    }
}

impl std::fmt::Debug for RecordBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBinding")
            .field("record", &self.record.key())
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Provider registry for plugin-based DNS provider creation
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: HashMap<String, Box<dyn DnsProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under `name`
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(&mut self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();

        let factory = self
            .providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create one provider per distinct provider configuration and bind
    /// every record to its provider, preserving record order
    pub fn bind_records(&self, records: &[RecordConfig]) -> Result<Vec<RecordBinding>> {
        let mut instances: HashMap<String, Arc<dyn DnsProvider>> = HashMap::new();
        let mut bindings = Vec::with_capacity(records.len());

        for record in records {
            let identity = serde_json::to_string(&record.provider)?;
            let provider = match instances.get(&identity) {
                Some(provider) => provider.clone(),
                None => {
                    let provider: Arc<dyn DnsProvider> = Arc::from(self.create_provider(&record.provider)?);
                    instances.insert(identity, provider.clone());
                    provider
                }
            };
            bindings.push(RecordBinding::new(record.clone(), provider));
        }

        Ok(bindings)
    }

    /// Registered provider type names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}
