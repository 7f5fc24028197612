//! Plugin-based component registry
//!
//! The registry allows provider clients and IP sources to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hdns_core::registry::ProviderRegistry;
//! use hdns_core::config::ProviderConfig;
//!
//! let registry = ProviderRegistry::new();
//! hdns_provider_hetzner::register(&registry);
//!
//! let provider = registry.create_provider(&ProviderConfig::default())?;
//! ```
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In hdns-provider-hetzner
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("hetzner", Box::new(HetznerFactory));
//! }
//! ```

use crate::config::{IpSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{IpSource, IpSourceFactory, ProviderClient, ProviderClientFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry for provider client and IP source factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. A poisoned lock is recovered, since the maps
/// are only ever mutated by a single insert.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered provider client factories
    providers: RwLock<HashMap<String, Box<dyn ProviderClientFactory>>>,

    /// Registered IP source factories
    ip_sources: RwLock<HashMap<String, Box<dyn IpSourceFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider client factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "hetzner")
    /// - `factory`: Factory object for creating client instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn ProviderClientFactory>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register an IP source factory
    ///
    /// # Parameters
    ///
    /// - `name`: IP source type name (e.g., "http")
    /// - `factory`: Factory object for creating IP source instances
    pub fn register_ip_source(&self, name: impl Into<String>, factory: Box<dyn IpSourceFactory>) {
        self.ip_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a provider client from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ProviderClient>)`: Created client
    /// - `Err(Error)`: If the provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn ProviderClient>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create an IP source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpSource>)`: Created IP source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_ip_source(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        let source_type = config.type_name();
        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown IP source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered IP source types
    pub fn list_ip_sources(&self) -> Vec<String> {
        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if an IP source type is registered
    pub fn has_ip_source(&self, name: &str) -> bool {
        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}
