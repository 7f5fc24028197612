// # Provider Client Trait
//
// Defines the interface to the DNS provider's record API.
//
// ## Implementations
//
// - Hetzner DNS: `hdns-provider-hetzner` crate
//
// ## Write Protocol
//
// The engine drives a two-step find-then-write protocol:
//
// ```rust,ignore
// match provider.find_record(&cred, zone_id, name, RecordType::A).await? {
//     None => provider.create_record(&cred, &desired).await?,
//     Some(existing) => provider.update_record(&cred, &existing.with_value(ip, ttl)).await?,
// };
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::model::{Credential, RecordType};

/// A DNS zone as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub records_count: u64,
}

/// A record as the provider stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Provider-assigned id; `None` until created
    pub id: Option<String>,
    pub zone_id: String,
    pub record_type: RecordType,
    pub name: String,
    pub value: String,
    pub ttl: u32,
}

impl ProviderRecord {
    /// Desired state for a record that does not exist yet
    pub fn desired(
        zone_id: impl Into<String>,
        record_type: RecordType,
        name: impl Into<String>,
        ip: Ipv4Addr,
        ttl: u32,
    ) -> Self {
        Self {
            id: None,
            zone_id: zone_id.into(),
            record_type,
            name: name.into(),
            value: ip.to_string(),
            ttl,
        }
    }

    /// Same record with value and TTL replaced
    pub fn with_value(mut self, ip: Ipv4Addr, ttl: u32) -> Self {
        self.value = ip.to_string();
        self.ttl = ttl;
        self
    }
}

/// Trait for DNS provider clients
///
/// Each method performs one API round trip. Clients hold no state between
/// calls; retries and scheduling belong to the engine.
///
/// # Errors
///
/// - Error payloads returned by the provider: [`Error::Provider`](crate::Error::Provider)
/// - Transport failures: [`Error::Http`](crate::Error::Http)
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Look up an existing record by zone, name and type
    async fn find_record(
        &self,
        credential: &Credential,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<ProviderRecord>, crate::Error>;

    /// Create a record; returns it with the provider-assigned id
    async fn create_record(
        &self,
        credential: &Credential,
        record: &ProviderRecord,
    ) -> Result<ProviderRecord, crate::Error>;

    /// Replace an existing record (matched by `record.id`)
    async fn update_record(
        &self,
        credential: &Credential,
        record: &ProviderRecord,
    ) -> Result<ProviderRecord, crate::Error>;

    /// List the zones the credential can manage
    async fn list_zones(&self, credential: &Credential) -> Result<Vec<Zone>, crate::Error>;

    /// Short name for logging (e.g. "hetzner")
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing provider clients from configuration
pub trait ProviderClientFactory: Send + Sync {
    /// Create a ProviderClient instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn ProviderClient>, crate::Error>;
}
