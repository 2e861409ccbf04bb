//! Core traits for ipfailover
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpChecker`]: Detect the current public address
//! - [`DnsProvider`]: Primitive record operations against a vendor API
//! - [`StateStore`]: Durable failover state
//! - [`ReachabilityProber`]: Bounded-time reachability check of an address
//! - [`MetricsCollector`]: Write-only observer of cycle outcomes

pub mod dns_provider;
pub mod ip_checker;
pub mod metrics;
pub mod prober;
pub mod state_store;

pub use dns_provider::{DesiredRecord, DnsProvider, DnsProviderFactory, ObservedRecord};
pub use ip_checker::IpChecker;
pub use metrics::{MetricsCollector, NoopMetrics};
pub use prober::{ProbeOutcome, ReachabilityProber};
pub use state_store::{AppliedRecord, CheckInfo, PersistedState, StateStore};
