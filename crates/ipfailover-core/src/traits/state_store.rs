// # State Store Trait
//
// Defines the interface for the durable failover state.
//
// ## Purpose
//
// The state store makes the polling loop idempotent and restart-safe by
// tracking:
// - The address last pushed to DNS
// - The most recent detection result
// - The consecutive primary probe failure count
// - Which records have converged to which address
//
// ## Implementations
//
// - File-based: single JSON document, atomic replace-on-write
// - Memory: same semantics without persistence
//
// ## Usage
//
// ```rust,ignore
// use ipfailover_core::StateStore;
//
// let failures = store.increment_primary_failure_count().await?;
// store.set_last_applied_address("203.0.113.10").await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State document format version
pub const STATE_VERSION: &str = "1.0";

/// Last address a single record converged to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub address: String,
    pub updated_at: DateTime<Utc>,
}

/// Most recent detection result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckInfo {
    pub address: String,
    pub time: Option<DateTime<Utc>>,
}

/// The complete persisted document
///
/// Owned by a [`StateStore`]; callers only ever see copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default = "default_version")]
    pub version: String,

    /// Address believed live in DNS; empty until the first update
    #[serde(default)]
    pub last_applied_address: String,

    #[serde(default)]
    pub last_change_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_check_address: String,

    #[serde(default)]
    pub last_check_time: Option<DateTime<Utc>>,

    /// Incremented each time `last_applied_address` is set
    #[serde(default)]
    pub update_count: u64,

    /// Consecutive primary probe failures
    #[serde(default)]
    pub primary_failure_count: u32,

    /// Convergence ledger keyed by record key
    #[serde(default)]
    pub records: BTreeMap<String, AppliedRecord>,
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: default_version(),
            last_applied_address: String::new(),
            last_change_time: None,
            last_check_address: String::new(),
            last_check_time: None,
            update_count: 0,
            primary_failure_count: 0,
            records: BTreeMap::new(),
        }
    }
}

impl PersistedState {
    pub fn check_info(&self) -> CheckInfo {
        CheckInfo {
            address: self.last_check_address.clone(),
            time: self.last_check_time,
        }
    }

    pub(crate) fn apply_address(&mut self, address: &str, now: DateTime<Utc>) {
        self.last_applied_address = address.to_string();
        self.last_change_time = Some(now);
        self.update_count += 1;
    }

    pub(crate) fn apply_check(&mut self, address: &str, time: DateTime<Utc>) {
        self.last_check_address = address.to_string();
        self.last_check_time = Some(time);
    }

    pub(crate) fn increment_failures(&mut self) -> u32 {
        self.primary_failure_count = self.primary_failure_count.saturating_add(1);
        self.primary_failure_count
    }

    pub(crate) fn mark_applied(&mut self, keys: &[String], address: &str, now: DateTime<Utc>) {
        for key in keys {
            self.records.insert(
                key.clone(),
                AppliedRecord {
                    address: address.to_string(),
                    updated_at: now,
                },
            );
        }
    }
}

/// Trait for state store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// - Every read-modify-write happens under one exclusive scope
/// - Writers self-heal: an unreadable document is treated as empty and
///   replaced on the next write
/// - Readers surface corruption as [`crate::Error::StateCorrupted`]; an
///   absent document is simply empty state
/// - No background tasks; cancellation happens by dropping the future
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Address currently believed live in DNS (empty if never set)
    async fn get_last_applied_address(&self) -> Result<String, crate::Error>;

    /// Record a new applied address
    ///
    /// Stamps `last_change_time` and increments `update_count`.
    async fn set_last_applied_address(&self, address: &str) -> Result<(), crate::Error>;

    async fn get_last_change_time(&self) -> Result<Option<DateTime<Utc>>, crate::Error>;

    async fn get_last_check_info(&self) -> Result<CheckInfo, crate::Error>;

    async fn set_last_check_info(&self, address: &str, time: DateTime<Utc>) -> Result<(), crate::Error>;

    async fn get_primary_failure_count(&self) -> Result<u32, crate::Error>;

    async fn set_primary_failure_count(&self, count: u32) -> Result<(), crate::Error>;

    async fn reset_primary_failure_count(&self) -> Result<(), crate::Error> {
        self.set_primary_failure_count(0).await
    }

    /// Atomically add one to the failure count and return the new value
    async fn increment_primary_failure_count(&self) -> Result<u32, crate::Error>;

    /// Convergence ledger
    async fn get_applied_records(&self) -> Result<BTreeMap<String, AppliedRecord>, crate::Error>;

    /// Record that `keys` now point at `address`
    async fn mark_records_applied(&self, keys: &[String], address: &str) -> Result<(), crate::Error>;

    /// Copy of the whole document
    async fn snapshot(&self) -> Result<PersistedState, crate::Error>;
}
