//! Configuration types for hdns
//!
//! This module defines all configuration structures used throughout the
//! workspace. Everything deserializes with serde and carries defaults, so a
//! minimal configuration is `{}`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::scheduler::RefreshSchedule;

/// Public IP echo services, tried in this order
pub const DEFAULT_IP_RESOLVERS: &[&str] = &[
    "https://nms.intellitrend.de",
    "https://api.ipify.org",
    "https://api.my-ip.io/ip",
    "https://api.ipy.ch",
    "https://ident.me/",
    "https://ifconfig.me/ip",
    "https://icanhazip.com/",
];

/// Hetzner DNS API base URL
pub const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

/// Main hdns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdnsConfig {
    /// Cron expression (with a leading seconds field) driving refresh cycles
    #[serde(default = "default_refresh")]
    pub refresh: String,

    /// DNS servers queried for each record, as `host:port`
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<String>,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub ip_source: IpSourceConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub state_store: StateStoreConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl HdnsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            refresh: default_refresh(),
            dns_servers: default_dns_servers(),
            resolver: ResolverConfig::default(),
            ip_source: IpSourceConfig::default(),
            provider: ProviderConfig::default(),
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        RefreshSchedule::parse(&self.refresh)?;

        if self.dns_servers.is_empty() {
            return Err(crate::Error::config("At least one DNS server is required"));
        }
        for server in &self.dns_servers {
            validate_endpoint(server)?;
        }

        self.resolver.validate()?;
        self.ip_source.validate()?;
        self.provider.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

impl Default for HdnsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a `host:port` DNS server endpoint
pub fn validate_endpoint(server: &str) -> Result<(), crate::Error> {
    let (host, port) = server
        .rsplit_once(':')
        .ok_or_else(|| crate::Error::config(format!("DNS server '{}' must be host:port", server)))?;

    if host.trim().is_empty() {
        return Err(crate::Error::config(format!("DNS server '{}' has an empty host", server)));
    }

    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(crate::Error::config(format!(
            "DNS server '{}' has an invalid port",
            server
        ))),
    }
}

/// DNS fan-out timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Timeout for one query against one server
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Deadline for all servers together
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
}

impl ResolverConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.query_timeout_ms == 0 || self.total_timeout_ms == 0 {
            return Err(crate::Error::config("DNS timeouts must be > 0"));
        }
        if self.query_timeout_ms > self.total_timeout_ms {
            return Err(crate::Error::config(
                "DNS query timeout cannot exceed the total resolve timeout",
            ));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
        }
    }
}

/// IP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// HTTP echo services (first usable answer wins)
    Http {
        #[serde(default = "default_ip_resolvers")]
        urls: Vec<String>,
        #[serde(default = "default_ip_timeout_secs")]
        timeout_secs: u64,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Http { urls, timeout_secs } => {
                if urls.is_empty() {
                    return Err(crate::Error::config("At least one IP resolver URL is required"));
                }
                for url in urls {
                    if !url.starts_with("https://") && !url.starts_with("http://") {
                        return Err(crate::Error::config(format!(
                            "IP resolver URL must use HTTP or HTTPS: {}",
                            url
                        )));
                    }
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("IP resolver timeout must be > 0"));
                }
                Ok(())
            }
        }
    }

    /// Get the IP source type name
    pub fn type_name(&self) -> &str {
        match self {
            IpSourceConfig::Http { .. } => "http",
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Http {
            urls: default_ip_resolvers(),
            timeout_secs: default_ip_timeout_secs(),
        }
    }
}

/// DNS provider configuration
///
/// Credentials are per record and do not appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Hetzner DNS
    Hetzner {
        #[serde(default = "default_hetzner_base_url")]
        base_url: String,
        /// Look records up but never write
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Hetzner { base_url, .. } => {
                if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "Hetzner base URL must use HTTP or HTTPS: {}",
                        base_url
                    )));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Hetzner { .. } => "hetzner",
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Hetzner {
            base_url: default_hetzner_base_url(),
            dry_run: false,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// JSON file store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

/// How the engine decides a record needs no provider write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCheck {
    /// The record's linked address is the current address
    #[default]
    LinkedAddress,
    /// The record has a linked address and DNS already returns the current IP
    ResolvedValue,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A repeated observation of the same IP younger than this is not recorded
    #[serde(default = "default_history_dedup_secs")]
    pub history_dedup_secs: u64,

    #[serde(default)]
    pub sync_check: SyncCheck,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn history_dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.history_dedup_secs as i64)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.history_dedup_secs > i64::MAX as u64 {
            return Err(crate::Error::config("History de-duplication window is too large"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_dedup_secs: default_history_dedup_secs(),
            sync_check: SyncCheck::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_refresh() -> String {
    "*/30 * * * * *".to_string()
}

fn default_dns_servers() -> Vec<String> {
    vec!["9.9.9.9:53".to_string()]
}

fn default_query_timeout_ms() -> u64 {
    2_000
}

fn default_total_timeout_ms() -> u64 {
    5_000
}

fn default_ip_resolvers() -> Vec<String> {
    DEFAULT_IP_RESOLVERS.iter().map(|s| s.to_string()).collect()
}

fn default_ip_timeout_secs() -> u64 {
    10
}

fn default_hetzner_base_url() -> String {
    HETZNER_API_BASE.to_string()
}

fn default_history_dedup_secs() -> u64 {
    3_600
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HdnsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh, "*/30 * * * * *");
        assert_eq!(config.dns_servers, vec!["9.9.9.9:53".to_string()]);
        assert_eq!(config.engine.sync_check, SyncCheck::LinkedAddress);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: HdnsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.resolver.query_timeout(), Duration::from_secs(2));
        assert_eq!(config.resolver.total_timeout(), Duration::from_secs(5));
        assert_eq!(config.engine.history_dedup_window(), chrono::Duration::hours(1));
        assert_eq!(config.provider.type_name(), "hetzner");
        assert_eq!(config.ip_source.type_name(), "http");
    }

    #[test]
    fn test_tagged_enums_deserialize() {
        let json = r#"{
            "provider": { "type": "hetzner", "base_url": "http://127.0.0.1:8080", "dry_run": true },
            "state_store": { "type": "file", "path": "/tmp/hdns.json" },
            "engine": { "sync_check": "resolved_value" }
        }"#;
        let config: HdnsConfig = serde_json::from_str(json).unwrap();

        assert!(matches!(config.provider, ProviderConfig::Hetzner { dry_run: true, .. }));
        assert!(matches!(config.state_store, StateStoreConfig::File { .. }));
        assert_eq!(config.engine.sync_check, SyncCheck::ResolvedValue);
    }

    #[test]
    fn test_invalid_refresh_rejected() {
        let mut config = HdnsConfig::default();
        config.refresh = "not a schedule".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        // Five-field expressions lack the seconds field
        config.refresh = "*/5 * * * *".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(validate_endpoint("9.9.9.9:53").is_ok());
        assert!(validate_endpoint("dns.quad9.net:53").is_ok());
        assert!(validate_endpoint("9.9.9.9").is_err());
        assert!(validate_endpoint(":53").is_err());
        assert!(validate_endpoint("9.9.9.9:0").is_err());
        assert!(validate_endpoint("9.9.9.9:dns").is_err());
    }

    #[test]
    fn test_empty_server_list_rejected() {
        let mut config = HdnsConfig::default();
        config.dns_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_query_timeout_cannot_exceed_total() {
        let resolver = ResolverConfig {
            query_timeout_ms: 6_000,
            total_timeout_ms: 5_000,
        };
        assert!(resolver.validate().is_err());
    }
}
