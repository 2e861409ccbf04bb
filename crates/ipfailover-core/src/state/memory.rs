// # Memory State Store
//
// In-memory implementation of StateStore.
//
// Same semantics as the file store without persistence: the failure counter
// and convergence ledger are lost on restart, so the first cycle after a
// restart reconciles every record again.
//
// ## When to Use
//
// - Tests
// - Embedding where DNS is re-asserted on every start anyway

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{AppliedRecord, CheckInfo, PersistedState, StateStore};

/// In-memory state store implementation
///
/// Cloning yields a handle to the same state.
///
/// # Example
///
/// ```rust
/// use ipfailover_core::state::MemoryStateStore;
/// use ipfailover_core::traits::StateStore;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStateStore::new();
/// assert_eq!(store.increment_primary_failure_count().await.unwrap(), 1);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<PersistedState>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_last_applied_address(&self) -> Result<String, Error> {
        Ok(self.inner.read().await.last_applied_address.clone())
    }

    async fn set_last_applied_address(&self, address: &str) -> Result<(), Error> {
        self.inner.write().await.apply_address(address, Utc::now());
        Ok(())
    }

    async fn get_last_change_time(&self) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.inner.read().await.last_change_time)
    }

    async fn get_last_check_info(&self) -> Result<CheckInfo, Error> {
        Ok(self.inner.read().await.check_info())
    }

    async fn set_last_check_info(&self, address: &str, time: DateTime<Utc>) -> Result<(), Error> {
        self.inner.write().await.apply_check(address, time);
        Ok(())
    }

    async fn get_primary_failure_count(&self) -> Result<u32, Error> {
        Ok(self.inner.read().await.primary_failure_count)
    }

    async fn set_primary_failure_count(&self, count: u32) -> Result<(), Error> {
        self.inner.write().await.primary_failure_count = count;
        Ok(())
    }

    async fn increment_primary_failure_count(&self) -> Result<u32, Error> {
        Ok(self.inner.write().await.increment_failures())
    }

    async fn get_applied_records(&self) -> Result<BTreeMap<String, AppliedRecord>, Error> {
        Ok(self.inner.read().await.records.clone())
    }

    async fn mark_records_applied(&self, keys: &[String], address: &str) -> Result<(), Error> {
        self.inner.write().await.mark_applied(keys, address, Utc::now());
        Ok(())
    }

    async fn snapshot(&self) -> Result<PersistedState, Error> {
        Ok(self.inner.read().await.clone())
    }
}
