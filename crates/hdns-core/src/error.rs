//! Error types for hdns
//!
//! Every fallible operation in the workspace returns [`Result`]. The variants
//! map one-to-one onto the failure kinds the reconciliation engine reacts to:
//! some end a cycle, some skip a single record, none terminate the process.

use thiserror::Error;

/// Result type alias for hdns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hdns
#[derive(Error, Debug)]
pub enum Error {
    /// No public IP resolver produced a usable address
    #[error("Public IP resolution failed: {0}")]
    ResolutionFailure(String),

    /// The DNS server list is empty
    #[error("No DNS servers configured")]
    NoServersConfigured,

    /// Every DNS server failed for a probe domain
    #[error("No consensus for {0}: all DNS servers failed")]
    NoConsensus(String),

    /// A single DNS query failed
    #[error("DNS query failed: {0}")]
    Dns(String),

    /// A value that should be a public IPv4 address is not one
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Error reported by the DNS provider (API payload or status)
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Transport failure talking to a remote HTTP endpoint
    #[error("HTTP error: {0}")]
    Http(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Uniqueness violation in a store
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem and socket errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a public IP resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::ResolutionFailure(msg.into())
    }

    /// Create a "no consensus" error for a probe domain
    pub fn no_consensus(domain: impl Into<String>) -> Self {
        Self::NoConsensus(domain.into())
    }

    /// Create a DNS query error
    pub fn dns(msg: impl Into<String>) -> Self {
        Self::Dns(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP transport error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the error came from the provider side of a write
    ///
    /// Both API-reported failures and transport failures leave the record
    /// stale until the next cycle.
    pub fn is_provider_side(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Http(_))
    }
}
