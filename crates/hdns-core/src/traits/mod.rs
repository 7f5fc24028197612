//! Core traits for hdns
//!
//! This module defines the abstract interfaces the engine is wired from.
//!
//! - [`IpSource`]: Determine the current public IPv4 address
//! - [`ProviderClient`]: Read and write records through the provider API
//! - [`AddressStore`], [`RecordStore`], [`HistoryStore`]: Persistence
//!
//! The per-server DNS query seam lives in [`crate::resolver`].

pub mod ip_source;
pub mod dns_provider;
pub mod state_store;

pub use ip_source::{IpSource, IpSourceFactory};
pub use dns_provider::{ProviderClient, ProviderClientFactory, ProviderRecord, Zone};
pub use state_store::{AddressStore, HistoryStore, RecordStore};
