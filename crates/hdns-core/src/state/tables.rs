// # Store Tables
//
// The in-memory representation shared by `MemoryStore` and `FileStore`.
// All invariants (unique IPs, a single current address, record uniqueness)
// are enforced here, so both stores behave identically; the stores only add
// locking and, for the file store, persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::model::{Address, Record, RecordHistory};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    addresses: BTreeMap<u64, Address>,
    #[serde(default)]
    records: BTreeMap<u64, Record>,
    #[serde(default)]
    history: BTreeMap<u64, RecordHistory>,
    #[serde(default)]
    last_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    // --- addresses ---

    pub fn upsert_address(&mut self, ip: Ipv4Addr, now: DateTime<Utc>) -> Address {
        if let Some(existing) = self.addresses.values().find(|a| a.ip == ip) {
            return existing.clone();
        }

        let address = Address {
            id: self.next_id(),
            ip,
            current: false,
            created_at: now,
        };
        self.addresses.insert(address.id, address.clone());
        address
    }

    pub fn set_current(&mut self, id: u64) -> Result<()> {
        if !self.addresses.contains_key(&id) {
            return Err(Error::not_found(format!("address {}", id)));
        }
        for address in self.addresses.values_mut() {
            address.current = address.id == id;
        }
        Ok(())
    }

    pub fn current_address(&self) -> Option<Address> {
        self.addresses.values().find(|a| a.current).cloned()
    }

    pub fn address(&self, id: u64) -> Option<Address> {
        self.addresses.get(&id).cloned()
    }

    pub fn list_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.addresses.values().cloned().collect();
        addresses.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        addresses
    }

    /// Keep only the newest address; records linked to removed ones lose
    /// their link and will be written again on the next cycle.
    pub fn prune_addresses(&mut self) -> Result<usize> {
        if self.addresses.len() <= 1 {
            return Err(Error::invalid_input("no address history to delete"));
        }

        let keep = self
            .addresses
            .values()
            .max_by_key(|a| (a.created_at, a.id))
            .map(|a| a.id)
            .ok_or_else(|| Error::invalid_input("no address history to delete"))?;

        let before = self.addresses.len();
        self.addresses.retain(|id, _| *id == keep);

        for record in self.records.values_mut() {
            if record.address_id.is_some_and(|id| id != keep) {
                record.address_id = None;
            }
        }

        Ok(before - self.addresses.len())
    }

    // --- records ---

    fn check_unique(&self, record: &Record) -> Result<()> {
        if let Some(other) = self.records.values().find(|r| r.collides_with(record)) {
            return Err(Error::conflict(format!(
                "record '{}' ({}) already exists in zone {} as id {}",
                record.name, record.record_type, record.zone_id, other.id
            )));
        }
        Ok(())
    }

    pub fn create_record(&mut self, mut record: Record) -> Result<Record> {
        record.validate()?;
        record.id = 0;
        self.check_unique(&record)?;

        record.id = self.next_id();
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    pub fn update_record(&mut self, record: &Record) -> Result<()> {
        if !self.records.contains_key(&record.id) {
            return Err(Error::not_found(format!("record {}", record.id)));
        }
        record.validate()?;
        self.check_unique(record)?;

        self.records.insert(record.id, record.clone());
        Ok(())
    }

    pub fn delete_record(&mut self, id: u64) -> Result<()> {
        if self.records.remove(&id).is_none() {
            return Err(Error::not_found(format!("record {}", id)));
        }
        self.history.retain(|_, h| h.record_id != id);
        Ok(())
    }

    pub fn record(&self, id: u64) -> Option<Record> {
        self.records.get(&id).cloned()
    }

    pub fn list_records(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    // --- history ---

    pub fn append_history(
        &mut self,
        record_id: u64,
        address_id: u64,
        resolved_ip: Ipv4Addr,
        resolved_at: DateTime<Utc>,
    ) -> RecordHistory {
        let entry = RecordHistory {
            id: self.next_id(),
            record_id,
            address_id,
            resolved_ip,
            resolved_at,
        };
        self.history.insert(entry.id, entry.clone());
        entry
    }

    pub fn last_history(&self, record_id: u64) -> Option<RecordHistory> {
        self.history
            .values()
            .filter(|h| h.record_id == record_id)
            .max_by_key(|h| (h.resolved_at, h.id))
            .cloned()
    }

    pub fn history(&self, record_id: Option<u64>) -> Vec<RecordHistory> {
        let mut entries: Vec<RecordHistory> = self
            .history
            .values()
            .filter(|h| record_id.is_none_or(|id| h.record_id == id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (b.resolved_at, b.id).cmp(&(a.resolved_at, a.id)));
        entries
    }

    pub fn clear_history(&mut self) -> usize {
        let removed = self.history.len();
        self.history.clear();
        removed
    }
}
