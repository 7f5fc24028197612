// # File Store
//
// File-based implementation of the address, record and history stores with
// crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: every mutation is written to a temp file, then renamed
// - Corruption detection: JSON is validated on load
// - Automatic backup: the previous file is kept as `.backup`
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "tables": {
//     "addresses": { "1": { "id": 1, "ip": "203.0.113.7", "current": true, ... } },
//     "records":   { "2": { "id": 2, "zone_id": "...", "name": "home", ... } },
//     "history":   { "3": { "id": 3, "record_id": 2, "resolved_ip": "203.0.113.7", ... } },
//     "last_id": 3
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::tables::Tables;
use crate::Error;
use crate::model::{Address, Record, RecordHistory};
use crate::traits::{AddressStore, HistoryStore, RecordStore};

/// State file format version
const STATE_FILE_VERSION: &str = "1";

/// File-based store with crash recovery
///
/// Mutations are applied to a copy of the tables and committed in memory
/// only after the copy has been written to disk, so a failed write leaves
/// both the file and the in-memory view unchanged.
///
/// # Example
///
/// ```rust,no_run
/// use hdns_core::state::FileStore;
/// use hdns_core::traits::AddressStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/hdns/state.json").await?;
///
///     // Atomically written to disk
///     let address = store.upsert_by_ip("203.0.113.7".parse()?).await?;
///     store.set_current(address.id).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: RwLock<Tables>,
}

/// Serializable state file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    #[serde(default)]
    tables: Tables,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing state file
    /// 3. If it is corrupted, try the backup
    /// 4. If both fail, start empty
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

        let tables = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    /// Load state from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<Tables, Error> {
        let content = match Self::read(path).await? {
            Some(content) => content,
            None => {
                tracing::debug!("State file does not exist: {}", path.display());
                return Ok(Tables::default());
            }
        };

        match Self::parse(path, &content) {
            Ok(tables) => Ok(tables),
            Err(e) => {
                tracing::warn!(
                    "State file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                let backup = match Self::read(&backup_path).await? {
                    Some(content) => content,
                    None => {
                        tracing::warn!("No backup file found. Starting with empty state.");
                        return Ok(Tables::default());
                    }
                };

                match Self::parse(&backup_path, &backup) {
                    Ok(tables) => {
                        tracing::info!("Recovered state from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore state file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(tables)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(Tables::default())
                    }
                }
            }
        }
    }

    async fn read(path: &Path) -> Result<Option<String>, Error> {
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path).await.map(Some).map_err(|e| {
            Error::storage(format!("Failed to read state file {}: {}", path.display(), e))
        })
    }

    fn parse(path: &Path, content: &str) -> Result<Tables, Error> {
        let state_file: StateFileFormat = serde_json::from_str(content).map_err(|e| {
            Error::storage(format!("Failed to parse state file {}: {}", path.display(), e))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.tables)
    }

    /// Write a snapshot atomically: temp file, backup of the old file, rename
    async fn persist(&self, tables: &Tables) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            tables: tables.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::storage(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().await.map_err(|e| {
                Error::storage(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply a mutation, persist it, then commit it in memory
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut guard = self.tables.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl AddressStore for FileStore {
    async fn upsert_by_ip(&self, ip: Ipv4Addr) -> Result<Address, Error> {
        let now = Utc::now();
        self.mutate(|t| Ok(t.upsert_address(ip, now))).await
    }

    async fn set_current(&self, id: u64) -> Result<(), Error> {
        self.mutate(|t| t.set_current(id)).await
    }

    async fn get_current(&self) -> Result<Option<Address>, Error> {
        Ok(self.tables.read().await.current_address())
    }

    async fn get(&self, id: u64) -> Result<Option<Address>, Error> {
        Ok(self.tables.read().await.address(id))
    }

    async fn list(&self) -> Result<Vec<Address>, Error> {
        Ok(self.tables.read().await.list_addresses())
    }

    async fn delete_all_except_most_recent(&self) -> Result<usize, Error> {
        self.mutate(|t| t.prune_addresses()).await
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn list(&self) -> Result<Vec<Record>, Error> {
        Ok(self.tables.read().await.list_records())
    }

    async fn get(&self, id: u64) -> Result<Option<Record>, Error> {
        Ok(self.tables.read().await.record(id))
    }

    async fn create(&self, record: Record) -> Result<Record, Error> {
        self.mutate(|t| t.create_record(record)).await
    }

    async fn update(&self, record: &Record) -> Result<(), Error> {
        self.mutate(|t| t.update_record(record)).await
    }

    async fn delete(&self, id: u64) -> Result<(), Error> {
        self.mutate(|t| t.delete_record(id)).await
    }
}

#[async_trait]
impl HistoryStore for FileStore {
    async fn append(
        &self,
        record_id: u64,
        address_id: u64,
        resolved_ip: Ipv4Addr,
        resolved_at: DateTime<Utc>,
    ) -> Result<RecordHistory, Error> {
        self.mutate(|t| Ok(t.append_history(record_id, address_id, resolved_ip, resolved_at)))
            .await
    }

    async fn last_for(&self, record_id: u64) -> Result<Option<RecordHistory>, Error> {
        Ok(self.tables.read().await.last_history(record_id))
    }

    async fn list_for(&self, record_id: u64) -> Result<Vec<RecordHistory>, Error> {
        Ok(self.tables.read().await.history(Some(record_id)))
    }

    async fn list_all(&self) -> Result<Vec<RecordHistory>, Error> {
        Ok(self.tables.read().await.history(None))
    }

    async fn delete_all(&self) -> Result<usize, Error> {
        self.mutate(|t| Ok(t.clear_history())).await
    }
}
