//! Metrics observer
//!
//! The engine reports what happened each cycle; collectors never influence
//! control flow.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Write-only sink for cycle metrics
pub trait MetricsCollector: Send + Sync {
    /// One address check attempted
    fn record_check(&self);

    /// One address check failed
    fn record_check_error(&self, checker: &str);

    /// A record converged to the target
    fn record_dns_update(&self, provider: &str, record: &str);

    /// A record failed to converge
    fn record_dns_error(&self, provider: &str, record: &str);

    /// Most recently detected public address
    fn set_current_address(&self, address: IpAddr);

    /// Time of the last applied address change
    fn set_last_change(&self, time: DateTime<Utc>);
}

/// Collector that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn record_check(&self) {}
    fn record_check_error(&self, _checker: &str) {}
    fn record_dns_update(&self, _provider: &str, _record: &str) {}
    fn record_dns_error(&self, _provider: &str, _record: &str) {}
    fn set_current_address(&self, _address: IpAddr) {}
    fn set_last_change(&self, _time: DateTime<Utc>) {}
}
