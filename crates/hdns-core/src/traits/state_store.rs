// # Store Traits
//
// Repository interfaces for the three persistent entities.
//
// ## Implementations
//
// - In-memory: [`MemoryStore`](crate::state::MemoryStore)
// - JSON file: [`FileStore`](crate::state::FileStore)
//
// Both implement all three traits on one value, so a single store instance
// can be shared behind three `Arc<dyn ...>` handles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;

use crate::model::{Address, Record, RecordHistory};

/// Observed public addresses
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Return the address with this IP, creating it if absent
    async fn upsert_by_ip(&self, ip: Ipv4Addr) -> Result<Address, crate::Error>;

    /// Flag `id` as current and clear the flag everywhere else
    ///
    /// Atomic: no reader ever observes zero or two current addresses as a
    /// result of this call.
    async fn set_current(&self, id: u64) -> Result<(), crate::Error>;

    /// The address flagged current, if any
    async fn get_current(&self) -> Result<Option<Address>, crate::Error>;

    async fn get(&self, id: u64) -> Result<Option<Address>, crate::Error>;

    /// All addresses, newest first
    async fn list(&self) -> Result<Vec<Address>, crate::Error>;

    /// Delete every address except the most recently created one
    ///
    /// Fails when there is nothing to delete. Returns the number removed.
    async fn delete_all_except_most_recent(&self) -> Result<usize, crate::Error>;
}

/// Managed DNS records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Record>, crate::Error>;

    async fn get(&self, id: u64) -> Result<Option<Record>, crate::Error>;

    /// Insert a new record; fails on a (name, zone, type) collision
    async fn create(&self, record: Record) -> Result<Record, crate::Error>;

    /// Replace a stored record; fails on collision with another record
    async fn update(&self, record: &Record) -> Result<(), crate::Error>;

    async fn delete(&self, id: u64) -> Result<(), crate::Error>;
}

/// Append-only record resolution trail
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(
        &self,
        record_id: u64,
        address_id: u64,
        resolved_ip: Ipv4Addr,
        resolved_at: DateTime<Utc>,
    ) -> Result<RecordHistory, crate::Error>;

    /// Most recent entry for a record
    async fn last_for(&self, record_id: u64) -> Result<Option<RecordHistory>, crate::Error>;

    /// Entries for one record, newest first
    async fn list_for(&self, record_id: u64) -> Result<Vec<RecordHistory>, crate::Error>;

    /// All entries, newest first
    async fn list_all(&self) -> Result<Vec<RecordHistory>, crate::Error>;

    /// Remove every entry; returns the number removed
    async fn delete_all(&self) -> Result<usize, crate::Error>;
}
