// # IP Source Trait
//
// Defines the interface for learning the caller's current public IPv4 address.
//
// ## Implementations
//
// - HTTP echo services: `hdns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use hdns_core::IpSource;
//
// let source = /* IpSource implementation */;
// let ip = source.current().await?;
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for public IP sources
///
/// One call produces one answer. Sources do not cache between calls and do
/// not persist anything; the engine decides what to do with the address.
///
/// # Contract
///
/// - The returned address has passed
///   [`validate_public_ipv4`](crate::address::validate_public_ipv4)
/// - When no candidate yields a usable address the call fails with
///   [`Error::ResolutionFailure`](crate::Error::ResolutionFailure)
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Determine the current public IPv4 address
    async fn current(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Short name for logging
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Create an IpSource instance from configuration
    fn create(
        &self,
        config: &crate::config::IpSourceConfig,
    ) -> Result<Box<dyn IpSource>, crate::Error>;
}
