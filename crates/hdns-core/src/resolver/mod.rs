//! Multi-server DNS resolution
//!
//! [`MultiServerResolver`] asks every configured DNS server the same question
//! at once and reports one [`Resolution`] per server, in configuration order.
//! Agreement between the answers is decided separately by
//! [`consensus::reduce`](crate::consensus::reduce).
//!
//! ```text
//!                 ┌──────────── server[0] ──► Resolution[0]
//!  probe domain ──┼──────────── server[1] ──► Resolution[1]
//!                 └──────────── server[n] ──► Resolution[n]
//!                      (shared deadline)
//! ```
//!
//! Queries run as independent tasks. The only thing they share is the
//! deadline; a server that has not answered when it passes is reported as
//! [`ResolutionError::Timeout`] and its task is aborted.

pub mod hickory;

pub use hickory::HickoryNameServer;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::model::{Resolution, ResolutionError};

/// Per-query timeout used when none is configured
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for a whole fan-out when none is configured
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the name actually queried for a record
///
/// `@` is the zone apex and `*` is probed through the `wildcard` label, since
/// a literal `*` cannot be asked for.
pub fn build_probe_domain(name: &str, domain: &str) -> String {
    match name {
        "@" => domain.to_string(),
        "*" => format!("wildcard.{}", domain),
        _ => format!("{}.{}", name, domain),
    }
}

/// A single DNS query against a single server
///
/// `server` is a `host:port` endpoint. Implementations return the raw A
/// record values; an empty answer is a success.
#[async_trait]
pub trait NameServerQuery: Send + Sync {
    async fn query(&self, server: &str, domain: &str) -> Result<Vec<String>>;
}

/// Concurrent resolver over a fixed list of DNS servers
pub struct MultiServerResolver {
    servers: Vec<String>,
    query: Arc<dyn NameServerQuery>,
    total_timeout: Duration,
}

impl MultiServerResolver {
    pub fn new(servers: Vec<String>, query: Arc<dyn NameServerQuery>) -> Self {
        Self {
            servers,
            query,
            total_timeout: DEFAULT_TOTAL_TIMEOUT,
        }
    }

    /// Resolver backed by real DNS queries
    pub fn from_config(servers: Vec<String>, config: &ResolverConfig) -> Self {
        let query = Arc::new(HickoryNameServer::new(config.query_timeout()));
        Self::new(servers, query).with_total_timeout(config.total_timeout())
    }

    pub fn with_total_timeout(mut self, total_timeout: Duration) -> Self {
        self.total_timeout = total_timeout;
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Query every server for `domain`
    ///
    /// Returns exactly one resolution per configured server, in the same
    /// order as the server list. Only an empty server list is an error;
    /// individual server failures are carried inside the resolutions.
    pub async fn resolve(&self, domain: &str) -> Result<Vec<Resolution>> {
        if self.servers.is_empty() {
            return Err(Error::NoServersConfigured);
        }

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.total_timeout;
        let mut slots: Vec<Option<Resolution>> = vec![None; self.servers.len()];
        let mut join_set: JoinSet<(usize, Resolution)> = JoinSet::new();

        for (index, server) in self.servers.iter().enumerate() {
            let query = Arc::clone(&self.query);
            let server = server.clone();
            let domain = domain.to_string();
            join_set.spawn(async move {
                let started = Instant::now();
                let outcome = query.query(&server, &domain).await;
                let latency = started.elapsed();
                let resolution = match outcome {
                    Ok(addresses) => Resolution::success(server, addresses, latency),
                    Err(e) => {
                        Resolution::failure(server, ResolutionError::Query(e.to_string()), latency)
                    }
                };
                (index, resolution)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((index, resolution)))) => {
                    match &resolution.error {
                        None => debug!(
                            domain,
                            server = resolution.server.as_str(),
                            addresses = ?resolution.addresses,
                            latency_ms = resolution.latency.as_millis() as u64,
                            "dns query succeeded"
                        ),
                        Some(err) => warn!(
                            domain,
                            server = resolution.server.as_str(),
                            error = %err,
                            "dns query failed"
                        ),
                    }
                    slots[index] = Some(resolution);
                }
                Ok(Some(Err(join_err))) => {
                    debug!(domain, error = %join_err, "dns query task join error");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        domain,
                        timeout_ms = self.total_timeout.as_millis() as u64,
                        "dns fan-out deadline reached; aborting remaining queries"
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Servers that never reported count as timed out.
        let elapsed = started.elapsed();
        let resolutions = slots
            .into_iter()
            .zip(self.servers.iter())
            .map(|(slot, server)| {
                slot.unwrap_or_else(|| {
                    Resolution::failure(server.clone(), ResolutionError::Timeout, elapsed)
                })
            })
            .collect();

        Ok(resolutions)
    }
}
