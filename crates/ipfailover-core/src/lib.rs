// # ipfailover-core
//
// Core library for ipfailover: keep DNS records pointed at a primary address
// while it is reachable, and at a secondary address once it has failed
// enough consecutive probes.
//
// ## Architecture Overview
//
// - **IpChecker**: Detects the current public address
// - **ReachabilityProber**: Bounded-time TCP probe of the primary
// - **FailoverDecider**: Turns probe outcomes and the persisted failure
//   counter into a target address
// - **reconciler**: Find-then-create-or-update against any DnsProvider
// - **StateStore**: Durable, atomically replaced state document
// - **FailoverEngine**: Interval loop tying the above together
// - **ProviderRegistry**: Factories that turn configuration into providers
// - **PrometheusMetrics**: Counters and gauges served on `/metrics`
//
// ## Design Principles
//
// 1. **Idempotent cycles**: a converged system makes no provider calls
// 2. **At most one flip per threshold**: the failure counter survives restarts
// 3. **Crash-safe state**: the document on disk is always whole
// 4. **Library-first**: the daemon is a thin shell around this crate

pub mod config;
pub mod engine;
pub mod error;
pub mod failover;
pub mod health;
pub mod metrics;
pub mod prober;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{FailoverConfig, ProviderConfig, RecordConfig, RecordType, StateFailureStrategy};
pub use engine::{CycleOutcome, EngineEvent, FailoverEngine};
pub use error::{Error, ErrorKind, Result};
pub use failover::{Decision, FailoverDecider, Role};
pub use health::{HealthPolicy, HealthReport, check_health};
pub use metrics::{MetricsServer, MetricsSnapshot, PrometheusMetrics};
pub use prober::TcpProber;
pub use registry::{ProviderRegistry, RecordBinding};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DnsProvider, IpChecker, MetricsCollector, ReachabilityProber, StateStore};
