//! Prometheus metrics
//!
//! [`PrometheusMetrics`] owns its own [`Registry`] so several engines (or
//! tests) can run in one process. [`server`] exposes it over HTTP.
//!
//! | Series | Kind | Labels |
//! |---|---|---|
//! | `ipfailover_checks_total` | counter | |
//! | `ipfailover_check_errors_total` | counter | |
//! | `ipfailover_updates_total` | counter | `provider`, `record` |
//! | `ipfailover_update_errors_total` | counter | `provider`, `record` |
//! | `ipfailover_current_ip_info` | gauge | `ip` |
//! | `ipfailover_last_change_timestamp_seconds` | gauge | |

pub mod server;

use chrono::{DateTime, Utc};
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::traits::MetricsCollector;

pub use server::MetricsServer;

const NAMESPACE: &str = "ipfailover";

/// Point-in-time copy of all metrics, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub checks: u64,
    pub check_errors: u64,
    /// Keyed by `provider/record`
    pub dns_updates: BTreeMap<String, u64>,
    /// Keyed by `provider/record`
    pub dns_errors: BTreeMap<String, u64>,
    pub current_address: Option<IpAddr>,
    pub last_change: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Labels {
    /// `(provider, record)` pairs with at least one update
    updates: BTreeSet<(String, String)>,
    /// `(provider, record)` pairs with at least one error
    errors: BTreeSet<(String, String)>,
    current_address: Option<IpAddr>,
}

/// [`MetricsCollector`] backed by a Prometheus registry
pub struct PrometheusMetrics {
    registry: Registry,
    checks: IntCounter,
    check_errors: IntCounter,
    updates: IntCounterVec,
    update_errors: IntCounterVec,
    current_ip: IntGaugeVec,
    last_change: Gauge,
    labels: Mutex<Labels>,
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(format!("{NAMESPACE}_{name}"), help)
}

impl PrometheusMetrics {
    /// Create every series and register it in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let checks = IntCounter::with_opts(opts("checks_total", "Total number of IP checks performed"))?;
        let check_errors = IntCounter::with_opts(opts("check_errors_total", "Total number of failed IP checks"))?;
        let updates = IntCounterVec::new(
            opts("updates_total", "Total number of DNS updates by provider and record"),
            &["provider", "record"],
        )?;
        let update_errors = IntCounterVec::new(
            opts("update_errors_total", "Total number of failed DNS updates by provider and record"),
            &["provider", "record"],
        )?;
        let current_ip = IntGaugeVec::new(opts("current_ip_info", "Address DNS currently points at"), &["ip"])?;
        let last_change = Gauge::with_opts(opts(
            "last_change_timestamp_seconds",
            "Unix time of the last address change",
        ))?;

        registry.register(Box::new(checks.clone()))?;
        registry.register(Box::new(check_errors.clone()))?;
        registry.register(Box::new(updates.clone()))?;
        registry.register(Box::new(update_errors.clone()))?;
        registry.register(Box::new(current_ip.clone()))?;
        registry.register(Box::new(last_change.clone()))?;

        Ok(Self {
            registry,
            checks,
            check_errors,
            updates,
            update_errors,
            current_ip,
            last_change,
            labels: Mutex::new(Labels::default()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn labels(&self) -> std::sync::MutexGuard<'_, Labels> {
        // A panic while holding the lock cannot leave the set inconsistent.
        self.labels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Gather and encode all series in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(prometheus::Error::Msg(format!("UTF-8 error: {e}"))))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let labels = self.labels();
        let per_series = |seen: &BTreeSet<(String, String)>, vec: &IntCounterVec| {
            seen.iter()
                .map(|(provider, record)| {
                    let count = vec.with_label_values(&[provider.as_str(), record.as_str()]).get();
                    (format!("{provider}/{record}"), count)
                })
                .collect::<BTreeMap<_, _>>()
        };

        let last_change = self.last_change.get();
        MetricsSnapshot {
            checks: self.checks.get(),
            check_errors: self.check_errors.get(),
            dns_updates: per_series(&labels.updates, &self.updates),
            dns_errors: per_series(&labels.errors, &self.update_errors),
            current_address: labels.current_address,
            last_change: (last_change > 0.0)
                .then(|| DateTime::from_timestamp(last_change as i64, 0))
                .flatten(),
        }
    }
}

impl MetricsCollector for PrometheusMetrics {
    fn record_check(&self) {
        self.checks.inc();
    }

    fn record_check_error(&self, _checker: &str) {
        self.check_errors.inc();
    }

    fn record_dns_update(&self, provider: &str, record: &str) {
        self.labels().updates.insert((provider.to_string(), record.to_string()));
        self.updates.with_label_values(&[provider, record]).inc();
    }

    fn record_dns_error(&self, provider: &str, record: &str) {
        self.labels().errors.insert((provider.to_string(), record.to_string()));
        self.update_errors.with_label_values(&[provider, record]).inc();
    }

    fn set_current_address(&self, address: IpAddr) {
        let mut labels = self.labels();
        self.current_ip.reset();
        self.current_ip.with_label_values(&[address.to_string().as_str()]).set(1);
        labels.current_address = Some(address);
    }

    fn set_last_change(&self, time: DateTime<Utc>) {
        self.last_change.set(time.timestamp() as f64);
    }
}
