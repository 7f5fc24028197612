//! Store implementations
//!
//! Both stores implement [`AddressStore`](crate::traits::AddressStore),
//! [`RecordStore`](crate::traits::RecordStore) and
//! [`HistoryStore`](crate::traits::HistoryStore).

mod tables;

pub mod memory;
pub mod file;

pub use memory::MemoryStore;
pub use file::FileStore;
