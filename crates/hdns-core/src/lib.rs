// # hdns-core
//
// Core library for the hdns DNS reconciliation engine.
//
// ## Architecture Overview
//
// This library keeps a set of provider-hosted A records pointed at the
// host's current public IPv4 address:
// - **IpSource**: Trait for determining the current public IP
// - **MultiServerResolver**: Concurrent lookups against several DNS servers
// - **consensus**: Reduces per-server answers to the addresses DNS believes in
// - **ProviderClient**: Trait for reading and writing records at the provider
// - **AddressStore / RecordStore / HistoryStore**: Persistent state
// - **ReconciliationEngine**: Runs refresh → resolve → decide → write cycles
// - **Scheduler**: Drives cycles from a cron expression
// - **ProviderRegistry**: Plugin-based registry for providers and IP sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Idempotency**: A cycle with nothing to change makes no provider writes

pub mod address;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use traits::{AddressStore, HistoryStore, IpSource, ProviderClient, RecordStore};
pub use engine::{CycleReport, EngineComponents, EngineEvent, ReconciliationEngine, RecordState};
pub use registry::ProviderRegistry;
pub use config::{HdnsConfig, IpSourceConfig, ProviderConfig, StateStoreConfig, SyncCheck};
pub use error::{Error, Result};
pub use model::{Address, Credential, Record, RecordHistory, RecordType, Resolution};
pub use resolver::MultiServerResolver;
pub use scheduler::{RefreshSchedule, Scheduler};
pub use state::{FileStore, MemoryStore};
