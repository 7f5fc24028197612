//! Persistent and ephemeral data model
//!
//! - [`Address`]: one observed public IPv4 value, at most one flagged current
//! - [`Record`]: an A record kept in sync with the current address
//! - [`RecordHistory`]: append-only trail of what each record resolved to
//! - [`Resolution`]: the outcome of one DNS query against one server
//!
//! Identifiers are assigned by the stores; the `id` of a value passed to a
//! `create`/`append` call is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resolver::build_probe_domain;

/// TTL used when a record does not specify one
pub const DEFAULT_TTL: u32 = 300;

/// One observed public IP value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: u64,
    pub ip: Ipv4Addr,
    /// Set on exactly the address chosen by the latest refresh
    pub current: bool,
    pub created_at: DateTime<Utc>,
}

/// Opaque provider API credential
///
/// The value is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw secret, for building request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<REDACTED>)")
    }
}

/// DNS record type
///
/// Only host address records are managed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    #[default]
    A,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DNS host name whose A record is kept in sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub credential: Credential,
    pub zone_id: String,
    pub record_type: RecordType,
    /// Label within the zone; `@` is the apex and `*` the wildcard
    pub name: String,
    pub domain: String,
    pub ttl: u32,
    /// Address the provider was last told about
    pub address_id: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Create an unsaved A record with the default TTL
    pub fn new(
        credential: Credential,
        zone_id: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            credential,
            zone_id: zone_id.into(),
            record_type: RecordType::A,
            name: name.into(),
            domain: domain.into(),
            ttl: DEFAULT_TTL,
            address_id: None,
            last_update: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Check the fields every provider call depends on
    pub fn validate(&self) -> Result<()> {
        if self.credential.is_blank() {
            return Err(Error::invalid_input("record credential is required"));
        }
        if self.zone_id.trim().is_empty() {
            return Err(Error::invalid_input("record zone id is required"));
        }
        if self.domain.trim().is_empty() {
            return Err(Error::invalid_input("record domain is required"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid_input("record name is required"));
        }
        Ok(())
    }

    /// Fully qualified name queried to learn what this record resolves to
    pub fn probe_domain(&self) -> String {
        build_probe_domain(&self.name, &self.domain)
    }

    /// True when `other` would violate the (name, zone, type) uniqueness rule
    pub fn collides_with(&self, other: &Record) -> bool {
        self.id != other.id
            && self.name == other.name
            && self.zone_id == other.zone_id
            && self.record_type == other.record_type
    }
}

/// One observation of what a record resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHistory {
    pub id: u64,
    pub record_id: u64,
    pub address_id: u64,
    pub resolved_ip: Ipv4Addr,
    pub resolved_at: DateTime<Utc>,
}

/// Why a single server produced no answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The shared deadline elapsed before the server answered
    Timeout,
    /// The query itself failed (refused, NXDOMAIN, network error)
    Query(String),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::Timeout => f.write_str("timed out"),
            ResolutionError::Query(msg) => f.write_str(msg),
        }
    }
}

/// Result of querying one DNS server for one probe domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub server: String,
    /// Raw answers as returned; may be empty
    pub addresses: Vec<String>,
    pub latency: Duration,
    pub error: Option<ResolutionError>,
}

impl Resolution {
    pub fn success(server: impl Into<String>, addresses: Vec<String>, latency: Duration) -> Self {
        Self {
            server: server.into(),
            addresses,
            latency,
            error: None,
        }
    }

    pub fn failure(server: impl Into<String>, error: ResolutionError, latency: Duration) -> Self {
        Self {
            server: server.into(),
            addresses: Vec::new(),
            latency,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
