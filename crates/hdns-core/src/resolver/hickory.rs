//! Per-server queries over plain UDP using hickory-resolver
//!
//! Each query builds a resolver pinned to a single upstream with caching
//! disabled, so the answer always reflects that server's current view.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::lookup_host;

use super::NameServerQuery;
use crate::error::{Error, Result};

/// [`NameServerQuery`] backed by real DNS traffic
#[derive(Debug, Clone)]
pub struct HickoryNameServer {
    query_timeout: Duration,
}

impl HickoryNameServer {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Turn a `host:port` endpoint into a socket address
    ///
    /// IP literals are used as-is; host names go through the system resolver.
    async fn endpoint(server: &str) -> Result<SocketAddr> {
        if let Ok(addr) = server.parse::<SocketAddr>() {
            return Ok(addr);
        }

        let mut candidates = lookup_host(server)
            .await
            .map_err(|e| Error::dns(format!("cannot resolve server {}: {}", server, e)))?;

        candidates
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| Error::dns(format!("server {} has no IPv4 address", server)))
    }

    fn build_resolver(&self, endpoint: SocketAddr) -> TokioAsyncResolver {
        let group = NameServerConfigGroup::from_ips_clear(&[endpoint.ip()], endpoint.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.ip_strategy = LookupIpStrategy::Ipv4Only;
        opts.cache_size = 0;
        opts.attempts = 1;
        opts.timeout = self.query_timeout;
        opts.try_tcp_on_error = false;

        TokioAsyncResolver::tokio(config, opts)
    }
}

#[async_trait]
impl NameServerQuery for HickoryNameServer {
    async fn query(&self, server: &str, domain: &str) -> Result<Vec<String>> {
        let endpoint = Self::endpoint(server).await?;
        let resolver = self.build_resolver(endpoint);

        let fqdn = if domain.ends_with('.') {
            domain.to_string()
        } else {
            format!("{}.", domain)
        };

        let lookup = resolver
            .lookup_ip(fqdn.as_str())
            .await
            .map_err(|e| Error::dns(format!("{} via {}: {}", domain, server, e)))?;

        Ok(lookup.iter().map(|ip| ip.to_string()).collect())
    }
}
