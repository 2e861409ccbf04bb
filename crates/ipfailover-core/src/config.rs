//! Configuration types for ipfailover
//!
//! Configuration is read from a YAML document and may be partially
//! overridden from the environment. Every field that has a sensible default
//! can be omitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main ipfailover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Seconds between decision cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Public-address endpoints, tried in order
    #[serde(default = "default_check_endpoints")]
    pub check_endpoints: Vec<String>,

    /// Address DNS points at while the primary is reachable
    pub primary_address: String,

    /// Address DNS points at after failover
    pub secondary_address: String,

    /// Consecutive probe failures tolerated before failing over
    #[serde(default = "default_failover_retries")]
    pub failover_retries: u32,

    /// What to do when the failure counter cannot be read or written
    #[serde(default)]
    pub state_failure_strategy: StateFailureStrategy,

    /// Path of the persisted state document
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Report a corrupted state file as healthy in health checks
    #[serde(default)]
    pub tolerate_corrupt_state: bool,

    /// Listen address for `/metrics` and `/health`; null disables the server
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: Option<SocketAddr>,

    /// DNS records to keep pointed at the current target
    pub records: Vec<RecordConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl FailoverConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("Invalid configuration: {e}")))
    }

    /// Read and parse a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `IPFAILOVER_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("IPFAILOVER_PRIMARY_ADDRESS") {
            self.primary_address = value;
        }
        if let Some(value) = lookup("IPFAILOVER_SECONDARY_ADDRESS") {
            self.secondary_address = value;
        }
        if let Some(value) = lookup("IPFAILOVER_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_override("IPFAILOVER_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("IPFAILOVER_FAILOVER_RETRIES") {
            self.failover_retries = parse_override("IPFAILOVER_FAILOVER_RETRIES", &value)?;
        }
        if let Some(value) = lookup("IPFAILOVER_STATE_FILE") {
            self.state_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("IPFAILOVER_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = lookup("IPFAILOVER_METRICS_ADDR") {
            self.metrics_addr = match value.trim() {
                "" | "off" => None,
                addr => Some(parse_override("IPFAILOVER_METRICS_ADDR", addr)?),
            };
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be > 0"));
        }

        if self.check_endpoints.is_empty() {
            return Err(Error::config("At least one check endpoint is required"));
        }
        if self.check_endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::config("Check endpoints cannot be empty strings"));
        }

        let primary = self.primary_ip()?;
        let secondary = self.secondary_ip()?;
        if primary == secondary {
            return Err(Error::config(format!(
                "primary_address and secondary_address must differ (both {primary})"
            )));
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::config(format!(
                    "log_level '{other}' is not valid. Valid levels: trace, debug, info, warn, error"
                )));
            }
        }

        if self.records.is_empty() {
            return Err(Error::config("No records configured"));
        }

        let mut keys = std::collections::HashSet::new();
        for record in &self.records {
            record.validate()?;
            record.validate_targets(&[primary, secondary])?;
            if !keys.insert(record.key()) {
                return Err(Error::config(format!("Duplicate record {}", record.key())));
            }
        }

        self.engine.validate()
    }

    /// Parsed primary address
    pub fn primary_ip(&self) -> Result<IpAddr> {
        parse_address("primary_address", &self.primary_address)
    }

    /// Parsed secondary address
    pub fn secondary_ip(&self) -> Result<IpAddr> {
        parse_address("secondary_address", &self.secondary_address)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn parse_address(field: &str, value: &str) -> Result<IpAddr> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("{field} is required")));
    }
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{field} '{value}' is not a valid IP address")))
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} has an invalid value: '{value}'")))
}

/// Reaction to failure-counter read/write errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFailureStrategy {
    /// Abort the cycle
    FailFast,
    /// Log and act as if the counter were zero
    #[default]
    ContinueWithWarning,
    /// Switch to the secondary address
    ImmediateFailover,
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID
        zone_id: String,
        /// Force the proxied flag on managed records
        #[serde(default)]
        proxied: Option<bool>,
    },

    /// Hetzner DNS provider
    Hetzner {
        /// Hetzner DNS API token
        api_token: String,
        /// Zone ID
        zone_id: String,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        #[serde(default)]
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Cloudflare {
                api_token, zone_id, ..
            } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(Error::config("Cloudflare zone_id cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Hetzner { api_token, zone_id } => {
                if api_token.is_empty() {
                    return Err(Error::config("Hetzner API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(Error::config("Hetzner zone_id cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom provider factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Hetzner { .. } => "hetzner",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

// Tokens never reach logs through Debug.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderConfig::Cloudflare {
                zone_id, proxied, ..
            } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<REDACTED>")
                .field("zone_id", zone_id)
                .field("proxied", proxied)
                .finish(),
            ProviderConfig::Hetzner { zone_id, .. } => f
                .debug_struct("Hetzner")
                .field("api_token", &"<REDACTED>")
                .field("zone_id", zone_id)
                .finish(),
            ProviderConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<REDACTED>")
                .finish(),
        }
    }
}

/// DNS record configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Fully qualified record name (e.g. "app.example.com")
    pub name: String,

    #[serde(rename = "type", default = "default_record_type")]
    pub record_type: RecordType,

    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Provider hosting this record
    pub provider: ProviderConfig,

    /// Provider-specific attributes passed through to the provider
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(name: impl Into<String>, record_type: RecordType, provider: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            record_type,
            ttl: default_ttl(),
            provider,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity of this record in the convergence ledger
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.provider.type_name(), self.name, self.record_type)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("Record name cannot be empty"));
        }
        if self.ttl == 0 {
            return Err(Error::config(format!("Record {} must have ttl > 0", self.name)));
        }
        self.provider.validate()
    }

    /// Check that every address this record may be pointed at fits its type
    pub fn validate_targets(&self, addresses: &[IpAddr]) -> Result<()> {
        if !self.record_type.is_address() {
            return Err(Error::config(format!(
                "Record {} has type {}; only A and AAAA records can follow the failover address",
                self.name, self.record_type
            )));
        }
        for address in addresses {
            if !self.record_type.accepts(&address.to_string()) {
                return Err(Error::config(format!(
                    "Record {} is type {} but address {address} belongs to the other family",
                    self.name, self.record_type
                )));
            }
        }
        Ok(())
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "TXT")]
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
        }
    }

    /// A and AAAA
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }

    /// Whether `value` is an acceptable payload for this type
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            RecordType::A => value.parse::<std::net::Ipv4Addr>().is_ok(),
            RecordType::Aaaa => value.parse::<std::net::Ipv6Addr>().is_ok(),
            RecordType::Cname | RecordType::Txt => !value.is_empty(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "TXT" => Ok(RecordType::Txt),
            "" => Err(Error::invalid_input("Record type cannot be empty")),
            other => Err(Error::invalid_input(format!("Unsupported record type: {other}"))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TCP port probed on the primary address
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,

    /// Connect deadline for the reachability probe (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Deadline for each IP check, provider call and state operation (in seconds)
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(Error::config("probe_timeout_secs must be > 0"));
        }
        if self.operation_timeout_secs == 0 {
            return Err(Error::config("operation_timeout_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_port: default_probe_port(),
            probe_timeout_secs: default_probe_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_check_endpoints() -> Vec<String> {
    vec![
        "https://ifconfig.io/ip".to_string(),
        "https://api.ipify.org".to_string(),
    ]
}

fn default_failover_retries() -> u32 {
    3
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/var/lib/ipfailover/state.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_addr() -> Option<SocketAddr> {
    Some(SocketAddr::from(([0, 0, 0, 0], 8080)))
}

fn default_record_type() -> RecordType {
    RecordType::A
}

fn default_ttl() -> u32 {
    300
}

fn default_probe_port() -> u16 {
    80
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
primary_address: 203.0.113.10
secondary_address: 198.51.100.20
failover_retries: 2
state_failure_strategy: immediate_failover
records:
  - name: app.example.com
    type: A
    ttl: 60
    provider:
      type: cloudflare
      api_token: cf-secret-token
      zone_id: zone123
      proxied: true
  - name: app.example.net
    provider:
      type: hetzner
      api_token: hz-secret-token
      zone_id: hz-zone
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let config = FailoverConfig::from_yaml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.check_endpoints.len(), 2);
        assert_eq!(config.failover_retries, 2);
        assert_eq!(config.state_failure_strategy, StateFailureStrategy::ImmediateFailover);
        assert_eq!(config.engine.probe_port, 80);
        assert_eq!(config.engine.probe_timeout_secs, 3);
        assert_eq!(config.metrics_addr, Some("0.0.0.0:8080".parse().unwrap()));

        assert_eq!(config.records[0].record_type, RecordType::A);
        assert_eq!(config.records[0].ttl, 60);
        assert_eq!(config.records[0].key(), "cloudflare:app.example.com:A");
        assert_eq!(config.records[1].ttl, 300);
        assert_eq!(config.records[1].provider.type_name(), "hetzner");
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = FailoverConfig::from_yaml_str(SAMPLE).unwrap();
        config
            .apply_overrides(|key| match key {
                "IPFAILOVER_PRIMARY_ADDRESS" => Some("192.0.2.1".to_string()),
                "IPFAILOVER_FAILOVER_RETRIES" => Some("0".to_string()),
                "IPFAILOVER_STATE_FILE" => Some("/tmp/ipf.json".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.primary_address, "192.0.2.1");
        assert_eq!(config.failover_retries, 0);
        assert_eq!(config.state_file, PathBuf::from("/tmp/ipf.json"));
    }

    #[test]
    fn metrics_addr_override_and_disable() {
        let mut config = FailoverConfig::from_yaml_str(SAMPLE).unwrap();
        config
            .apply_overrides(|key| (key == "IPFAILOVER_METRICS_ADDR").then(|| "127.0.0.1:9100".to_string()))
            .unwrap();
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));

        config
            .apply_overrides(|key| (key == "IPFAILOVER_METRICS_ADDR").then(|| "off".to_string()))
            .unwrap();
        assert_eq!(config.metrics_addr, None);

        let err = config
            .apply_overrides(|key| (key == "IPFAILOVER_METRICS_ADDR").then(|| ":8080".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let disabled = FailoverConfig::from_yaml_str(&format!("{SAMPLE}metrics_addr: null\n")).unwrap();
        assert_eq!(disabled.metrics_addr, None);
    }

    #[test]
    fn invalid_numeric_override_is_config_error() {
        let mut config = FailoverConfig::from_yaml_str(SAMPLE).unwrap();
        let err = config
            .apply_overrides(|key| {
                (key == "IPFAILOVER_POLL_INTERVAL_SECS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_bad_values() {
        let base = FailoverConfig::from_yaml_str(SAMPLE).unwrap();

        let mut c = base.clone();
        c.poll_interval_secs = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.secondary_address = c.primary_address.clone();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.primary_address = "not-an-ip".to_string();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.records[0].ttl = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.records.push(c.records[0].clone());
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.records.clear();
        assert!(c.validate().is_err());

        let mut c = base;
        c.log_level = "verbose".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn missing_credentials_rejected() {
        let provider = ProviderConfig::Hetzner {
            api_token: String::new(),
            zone_id: "zone".to_string(),
        };
        assert!(provider.validate().is_err());
    }

    #[test]
    fn unknown_provider_type_fails_to_parse() {
        let yaml = SAMPLE.replace("type: hetzner", "type: gandi");
        assert!(FailoverConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn record_type_parsing() {
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert_eq!("A".parse::<RecordType>().unwrap(), RecordType::A);
        assert!("".parse::<RecordType>().is_err());
        assert!("MX".parse::<RecordType>().is_err());
    }

    #[test]
    fn record_type_family() {
        assert!(RecordType::A.accepts("10.0.0.1"));
        assert!(!RecordType::A.accepts("2001:db8::1"));
        assert!(RecordType::Aaaa.accepts("2001:db8::1"));
        assert!(!RecordType::Aaaa.accepts("10.0.0.1"));
    }

    #[test]
    fn record_family_must_match_addresses() {
        let base = FailoverConfig::from_yaml_str(SAMPLE).unwrap();

        let mut c = base.clone();
        c.records[0].record_type = RecordType::Aaaa;
        let err = c.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("app.example.com"));

        let mut c = base.clone();
        c.primary_address = "2001:db8::10".to_string();
        assert!(c.validate().is_err(), "mixed families cannot share an A record");

        let mut c = base.clone();
        c.primary_address = "2001:db8::10".to_string();
        c.secondary_address = "2001:db8::20".to_string();
        for record in &mut c.records {
            record.record_type = RecordType::Aaaa;
        }
        c.validate().unwrap();
    }

    #[test]
    fn non_address_record_types_rejected() {
        let base = FailoverConfig::from_yaml_str(SAMPLE).unwrap();
        for record_type in [RecordType::Cname, RecordType::Txt] {
            let mut c = base.clone();
            c.records[1].record_type = record_type;
            let err = c.validate().unwrap_err();
            assert!(err.to_string().contains("only A and AAAA"), "{record_type}: {err}");
        }
    }

    #[test]
    fn debug_redacts_tokens() {
        let config = FailoverConfig::from_yaml_str(SAMPLE).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("cf-secret-token"));
        assert!(!rendered.contains("hz-secret-token"));
    }
}
