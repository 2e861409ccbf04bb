//! Test doubles and common utilities for contract tests
//!
//! Every double is cheap to clone and clones share counters, so a test can
//! hand one copy to the engine and keep another for assertions.

#![allow(dead_code)]

use async_trait::async_trait;
use ipfailover_core::config::{EngineConfig, FailoverConfig, ProviderConfig, RecordConfig, RecordType};
use ipfailover_core::error::{Error, Result};
use ipfailover_core::traits::{
    DesiredRecord, DnsProvider, IpChecker, ObservedRecord, ProbeOutcome, ReachabilityProber, StateStore,
};
use ipfailover_core::{FailoverEngine, EngineEvent, MetricsCollector, RecordBinding};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PRIMARY: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1));
pub const SECONDARY: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2));
pub const PUBLIC: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 10));

/// IpChecker returning a settable address, or an error when unset
#[derive(Clone)]
pub struct ScriptedIpChecker {
    address: Arc<Mutex<Option<IpAddr>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedIpChecker {
    pub fn fixed(address: IpAddr) -> Self {
        Self {
            address: Arc::new(Mutex::new(Some(address))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            address: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, address: Option<IpAddr>) {
        *self.address.lock().unwrap() = address;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpChecker for ScriptedIpChecker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn current_ip(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let address = *self.address.lock().unwrap();
        address.ok_or_else(|| Error::ip_check("scripted", "no address available"))
    }
}

/// Prober whose outcome is switched by the test
#[derive(Clone)]
pub struct ScriptedProber {
    reachable: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
}

impl ScriptedProber {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(reachable)),
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProber for ScriptedProber {
    async fn probe(&self, _address: IpAddr, _timeout: Duration) -> ProbeOutcome {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            ProbeOutcome::Reachable
        } else {
            ProbeOutcome::Unreachable {
                reason: "connection refused".to_string(),
            }
        }
    }
}

/// A DnsProvider holding records in memory and counting every call
#[derive(Clone)]
pub struct InMemoryDnsProvider {
    name: String,
    records: Arc<Mutex<HashMap<(String, RecordType), ObservedRecord>>>,
    next_id: Arc<AtomicUsize>,
    get_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    validate_calls: Arc<AtomicUsize>,
    fail_status: Arc<Mutex<Option<u16>>>,
    hang: Arc<AtomicBool>,
    dry_run: Arc<AtomicBool>,
}

impl InMemoryDnsProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            get_calls: Arc::new(AtomicUsize::new(0)),
            create_calls: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
            validate_calls: Arc::new(AtomicUsize::new(0)),
            fail_status: Arc::new(Mutex::new(None)),
            hang: Arc::new(AtomicBool::new(false)),
            dry_run: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a provider that shares records and counters with `other`
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }

    /// Make every call fail with this HTTP status (None to recover)
    pub fn fail_with_status(&self, status: Option<u16>) {
        *self.fail_status.lock().unwrap() = status;
    }

    /// Make every record call block forever (validate still answers)
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Report success for mutations without storing them
    pub fn dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::SeqCst);
    }

    fn store(&self, record: ObservedRecord) -> ObservedRecord {
        if !self.dry_run.load(Ordering::SeqCst) {
            self.records
                .lock()
                .unwrap()
                .insert((record.name.clone(), record.record_type), record.clone());
        }
        record
    }

    pub fn seed(&self, name: &str, record_type: RecordType, value: &str, metadata: &[(&str, &str)]) {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().insert(
            (name.to_string(), record_type),
            ObservedRecord {
                id,
                name: name.to_string(),
                record_type,
                value: value.to_string(),
                ttl: 300,
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    pub fn record(&self, name: &str, record_type: RecordType) -> Option<ObservedRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(name.to_string(), record_type))
            .cloned()
    }

    pub fn value_of(&self, name: &str, record_type: RecordType) -> Option<String> {
        self.record(name, record_type).map(|r| r.value)
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// Every call except validate
    pub fn total_calls(&self) -> usize {
        self.get_calls() + self.create_calls() + self.update_calls() + self.delete_calls()
    }

    async fn gate(&self) -> Result<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.injected_failure()
    }

    fn injected_failure(&self) -> Result<()> {
        let status = *self.fail_status.lock().unwrap();
        match status {
            Some(status) => Err(Error::http(
                status,
                format!("memory://{}", self.name),
                "injected failure",
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DnsProvider for InMemoryDnsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_record(&self, name: &str, record_type: RecordType) -> Result<Option<ObservedRecord>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(self.record(name, record_type))
    }

    async fn create_record(&self, desired: &DesiredRecord) -> Result<ObservedRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        let record = ObservedRecord {
            id: format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            name: desired.name.clone(),
            record_type: desired.record_type,
            value: desired.value.clone(),
            ttl: desired.ttl,
            metadata: desired.metadata.clone(),
        };
        Ok(self.store(record))
    }

    async fn update_record(&self, existing: &ObservedRecord, desired: &DesiredRecord) -> Result<ObservedRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        let record = ObservedRecord {
            id: existing.id.clone(),
            name: existing.name.clone(),
            record_type: existing.record_type,
            value: desired.value.clone(),
            ttl: desired.ttl,
            metadata: existing.carry_over(desired),
        };
        Ok(self.store(record))
    }

    async fn delete_record(&self, existing: &ObservedRecord) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        if !self.dry_run.load(Ordering::SeqCst) {
            self.records
                .lock()
                .unwrap()
                .remove(&(existing.name.clone(), existing.record_type));
        }
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()
    }
}

/// Provider config naming an in-memory provider
pub fn memory_provider_config(name: &str) -> ProviderConfig {
    ProviderConfig::Custom {
        factory: name.to_string(),
        config: serde_json::json!({}),
    }
}

pub fn record(name: &str, provider: &str) -> RecordConfig {
    RecordConfig::new(name, RecordType::A, memory_provider_config(provider)).with_ttl(60)
}

/// Minimal valid configuration for the given records
pub fn test_config(records: Vec<RecordConfig>, failover_retries: u32) -> FailoverConfig {
    FailoverConfig {
        poll_interval_secs: 1,
        check_endpoints: vec!["http://unused.invalid".to_string()],
        primary_address: PRIMARY.to_string(),
        secondary_address: SECONDARY.to_string(),
        failover_retries,
        state_failure_strategy: Default::default(),
        state_file: std::path::PathBuf::from("unused.json"),
        log_level: "info".to_string(),
        tolerate_corrupt_state: false,
        metrics_addr: None,
        records,
        engine: EngineConfig {
            probe_port: 80,
            probe_timeout_secs: 1,
            operation_timeout_secs: 1,
            event_channel_capacity: 100,
        },
    }
}

/// Everything a contract test needs to drive an engine
pub struct Harness {
    pub engine: FailoverEngine,
    pub events: mpsc::Receiver<EngineEvent>,
    pub checker: ScriptedIpChecker,
    pub prober: ScriptedProber,
}

/// Build an engine over in-memory doubles
///
/// `bindings` pairs each record with the provider double hosting it.
pub fn harness(
    config: &FailoverConfig,
    store: Arc<dyn StateStore>,
    metrics: Arc<dyn MetricsCollector>,
    bindings: Vec<(RecordConfig, InMemoryDnsProvider)>,
) -> Harness {
    let checker = ScriptedIpChecker::fixed(PUBLIC);
    let prober = ScriptedProber::new(true);

    let bindings = bindings
        .into_iter()
        .map(|(record, provider)| {
            let provider: Arc<dyn DnsProvider> = Arc::new(InMemoryDnsProvider::sharing_counters_with(&provider));
            RecordBinding::new(record, provider)
        })
        .collect();

    let (engine, events) = FailoverEngine::new(
        config,
        Arc::new(checker.clone()),
        Arc::new(prober.clone()),
        store,
        metrics,
        bindings,
    )
    .expect("engine construction succeeds");

    Harness {
        engine,
        events,
        checker,
        prober,
    }
}

/// Drain every event currently queued
pub fn drain(events: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
