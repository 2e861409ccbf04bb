// # File State Store
//
// File-based implementation of StateStore with crash-safe writes.
//
// ## Write protocol
//
// 1. Serialize the whole document
// 2. Write it to `<path>.tmp`, flush and fsync
// 3. Rename the temp file over `<path>`
//
// A crash before step 3 leaves the canonical file untouched and at worst an
// orphaned temp file, which the next write overwrites.
//
// ## Corruption
//
// - Readers get `Error::StateCorrupted` so health checks can report it
// - Writers log a warning and start from empty state, replacing the bad file
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "last_applied_address": "203.0.113.10",
//   "last_change_time": "2025-01-09T12:00:00Z",
//   "last_check_address": "203.0.113.10",
//   "last_check_time": "2025-01-09T12:05:00Z",
//   "update_count": 3,
//   "primary_failure_count": 0,
//   "records": {
//     "cloudflare:app.example.com:A": {
//       "address": "203.0.113.10",
//       "updated_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::state::MemoryStateStore;
use crate::traits::state_store::{AppliedRecord, CheckInfo, PersistedState, StateStore, STATE_VERSION};

/// File-based state store
///
/// The document is re-read on every operation, so external edits and
/// restarts are always observed. One store-wide lock serializes writers and
/// lets readers proceed concurrently.
///
/// # Example
///
/// ```rust,no_run
/// use ipfailover_core::state::FileStateStore;
/// use ipfailover_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/ipfailover/state.json").await?;
///
///     store.set_last_applied_address("203.0.113.10").await?;
///     assert_eq!(store.get_last_applied_address().await?, "203.0.113.10");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStateStore {
    /// Create a store backed by `path`
    ///
    /// Creates missing parent directories. The file itself is not created
    /// until the first write.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.tmp`
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    /// Load for readers: absent is empty, unparsable is an error
    async fn load(&self) -> Result<PersistedState, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!("State file does not exist: {}", self.path.display());
                return Ok(PersistedState::default());
            }
            Err(e) => {
                return Err(Error::state_store(
                    "read",
                    format!("{}: {}", self.path.display(), e),
                ));
            }
        };

        let state: PersistedState = serde_json::from_str(&content)
            .map_err(|e| Error::state_corrupted(&self.path, e.to_string()))?;

        if state.version != STATE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Loading anyway.",
                STATE_VERSION,
                state.version
            );
        }

        Ok(state)
    }

    /// Load for writers: any failure yields empty state
    async fn load_or_heal(&self) -> PersistedState {
        match self.load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Discarding unreadable state and starting fresh: {}", e);
                PersistedState::default()
            }
        }
    }

    /// Write the document to the temp path and fsync it
    pub(crate) async fn stage(&self, state: &PersistedState) -> Result<PathBuf, Error> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::state_store("serialize", e.to_string()))?;

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            Error::state_store("create", format!("{}: {}", temp_path.display(), e))
        })?;

        file.write_all(json.as_bytes()).await.map_err(|e| {
            Error::state_store("write", format!("{}: {}", temp_path.display(), e))
        })?;
        file.flush().await.map_err(|e| {
            Error::state_store("flush", format!("{}: {}", temp_path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            Error::state_store("fsync", format!("{}: {}", temp_path.display(), e))
        })?;

        Ok(temp_path)
    }

    /// Atomically replace the canonical document with a staged one
    pub(crate) async fn commit(&self, temp_path: &Path) -> Result<(), Error> {
        fs::rename(temp_path, &self.path).await.map_err(|e| {
            Error::state_store(
                "rename",
                format!("{} -> {}: {}", temp_path.display(), self.path.display(), e),
            )
        })?;
        tracing::trace!("State written to {}", self.path.display());
        Ok(())
    }

    /// Read-modify-write under the exclusive lock
    async fn mutate<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut PersistedState) -> T + Send,
        T: Send,
    {
        let _guard = self.lock.write().await;
        let mut state = self.load_or_heal().await;
        let out = f(&mut state);
        let staged = self.stage(&state).await?;
        self.commit(&staged).await?;
        Ok(out)
    }

    /// In-memory copy of the current document that never writes back
    ///
    /// Used for dry runs: the engine sees the persisted counter and ledger,
    /// but nothing it records reaches the file. An unreadable document is
    /// replaced by empty state in the copy only.
    pub async fn detached(&self) -> MemoryStateStore {
        let _guard = self.lock.read().await;
        let state = match self.load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Detached copy starts from empty state: {}", e);
                PersistedState::default()
            }
        };
        MemoryStateStore::with_state(state)
    }

    async fn read<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(PersistedState) -> T + Send,
    {
        let _guard = self.lock.read().await;
        self.load().await.map(f)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_last_applied_address(&self) -> Result<String, Error> {
        self.read(|s| s.last_applied_address).await
    }

    async fn set_last_applied_address(&self, address: &str) -> Result<(), Error> {
        let now = Utc::now();
        self.mutate(|s| s.apply_address(address, now)).await
    }

    async fn get_last_change_time(&self) -> Result<Option<DateTime<Utc>>, Error> {
        self.read(|s| s.last_change_time).await
    }

    async fn get_last_check_info(&self) -> Result<CheckInfo, Error> {
        self.read(|s| s.check_info()).await
    }

    async fn set_last_check_info(&self, address: &str, time: DateTime<Utc>) -> Result<(), Error> {
        self.mutate(|s| s.apply_check(address, time)).await
    }

    async fn get_primary_failure_count(&self) -> Result<u32, Error> {
        self.read(|s| s.primary_failure_count).await
    }

    async fn set_primary_failure_count(&self, count: u32) -> Result<(), Error> {
        self.mutate(|s| s.primary_failure_count = count).await
    }

    async fn increment_primary_failure_count(&self) -> Result<u32, Error> {
        self.mutate(|s| s.increment_failures()).await
    }

    async fn get_applied_records(&self) -> Result<BTreeMap<String, AppliedRecord>, Error> {
        self.read(|s| s.records).await
    }

    async fn mark_records_applied(&self, keys: &[String], address: &str) -> Result<(), Error> {
        let now = Utc::now();
        self.mutate(|s| s.mark_applied(keys, address, now)).await
    }

    async fn snapshot(&self) -> Result<PersistedState, Error> {
        self.read(|s| s).await
    }
}
