// # Memory Store
//
// In-memory implementation of the address, record and history stores.
//
// ## Crash Behavior
//
// - All state is lost on restart
// - The first cycle after a restart sees no linked addresses and therefore
//   writes every record once
//
// ## When to Use
//
// - Tests
// - Deployments where one provider write per record after restart is harmless

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::tables::Tables;
use crate::Error;
use crate::model::{Address, Record, RecordHistory};
use crate::traits::{AddressStore, HistoryStore, RecordStore};

/// In-memory store implementation
///
/// Clones share the same tables, so one instance can be handed to the
/// engine as all three stores.
///
/// # Example
///
/// ```rust,no_run
/// use hdns_core::state::MemoryStore;
/// use hdns_core::traits::AddressStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let address = store.upsert_by_ip("203.0.113.7".parse()?).await?;
///     store.set_current(address.id).await?;
///
///     assert_eq!(store.get_current().await?.map(|a| a.ip), Some(address.ip));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn upsert_by_ip(&self, ip: Ipv4Addr) -> Result<Address, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.upsert_address(ip, Utc::now()))
    }

    async fn set_current(&self, id: u64) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.set_current(id)
    }

    async fn get_current(&self) -> Result<Option<Address>, Error> {
        Ok(self.inner.read().await.current_address())
    }

    async fn get(&self, id: u64) -> Result<Option<Address>, Error> {
        Ok(self.inner.read().await.address(id))
    }

    async fn list(&self) -> Result<Vec<Address>, Error> {
        Ok(self.inner.read().await.list_addresses())
    }

    async fn delete_all_except_most_recent(&self) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        guard.prune_addresses()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Record>, Error> {
        Ok(self.inner.read().await.list_records())
    }

    async fn get(&self, id: u64) -> Result<Option<Record>, Error> {
        Ok(self.inner.read().await.record(id))
    }

    async fn create(&self, record: Record) -> Result<Record, Error> {
        let mut guard = self.inner.write().await;
        guard.create_record(record)
    }

    async fn update(&self, record: &Record) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.update_record(record)
    }

    async fn delete(&self, id: u64) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.delete_record(id)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(
        &self,
        record_id: u64,
        address_id: u64,
        resolved_ip: Ipv4Addr,
        resolved_at: DateTime<Utc>,
    ) -> Result<RecordHistory, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.append_history(record_id, address_id, resolved_ip, resolved_at))
    }

    async fn last_for(&self, record_id: u64) -> Result<Option<RecordHistory>, Error> {
        Ok(self.inner.read().await.last_history(record_id))
    }

    async fn list_for(&self, record_id: u64) -> Result<Vec<RecordHistory>, Error> {
        Ok(self.inner.read().await.history(Some(record_id)))
    }

    async fn list_all(&self) -> Result<Vec<RecordHistory>, Error> {
        Ok(self.inner.read().await.history(None))
    }

    async fn delete_all(&self) -> Result<usize, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.clear_history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Credential;

    #[tokio::test]
    async fn test_memory_store_addresses() {
        let store = MemoryStore::new();

        let a = store.upsert_by_ip("203.0.113.1".parse().unwrap()).await.unwrap();
        let b = store.upsert_by_ip("203.0.113.2".parse().unwrap()).await.unwrap();
        store.set_current(a.id).await.unwrap();
        store.set_current(b.id).await.unwrap();

        let current = store.get_current().await.unwrap().unwrap();
        assert_eq!(current.id, b.id);
        assert!(!AddressStore::get(&store, a.id).await.unwrap().unwrap().current);
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_set_current() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 1..=8u8 {
            ids.push(store.upsert_by_ip(Ipv4Addr::new(203, 0, 113, i)).await.unwrap().id);
        }

        let mut handles = Vec::new();
        for id in ids {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.set_current(id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let addresses = AddressStore::list(&store).await.unwrap();
        assert_eq!(addresses.iter().filter(|a| a.current).count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();

        let record = Record::new(Credential::new("token"), "zone-1", "home", "example.com");
        let created = store.create(record).await.unwrap();

        let seen = RecordStore::get(&clone, created.id).await.unwrap();
        assert_eq!(seen.map(|r| r.name), Some("home".to_string()));
    }
}
