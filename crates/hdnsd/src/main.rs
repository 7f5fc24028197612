// # hdnsd - hdns Daemon
//
// This is a thin integration layer. All reconciliation logic lives in
// hdns-core; the daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering the provider and IP source
// 4. Opening the store and seeding the managed records
// 5. Running the scheduler until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Schedule and DNS
// - `HDNS_REFRESH`: Cron expression with seconds (default `*/30 * * * * *`)
// - `HDNS_DNS_SERVERS`: Comma-separated `host:port` list (default `9.9.9.9:53`)
// - `HDNS_QUERY_TIMEOUT_MS`: Per-server query timeout (default 2000)
// - `HDNS_RESOLVE_TIMEOUT_MS`: Deadline for all servers together (default 5000)
//
// ### Public IP
// - `HDNS_IP_RESOLVERS`: Comma-separated echo service URLs (built-in list by default)
//
// ### DNS Provider
// - `HDNS_PROVIDER_TYPE`: Provider type (hetzner)
// - `HDNS_PROVIDER_BASE_URL`: API base URL override
// - `HDNS_API_TOKEN`: API token for the seeded records
// - `HDNS_MODE`: `dry-run` to look records up without writing
//
// ### Records
// - `HDNS_RECORDS`: Comma-separated `name:domain:zone_id[:ttl]` entries
//
// ### State Store
// - `HDNS_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `HDNS_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Engine
// - `HDNS_SYNC_CHECK`: `linked_address` (default) or `resolved_value`
// - `HDNS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export HDNS_API_TOKEN=your_hetzner_token
// export HDNS_RECORDS=home:example.com:zone123,@:example.org:zone456:60
// export HDNS_STATE_STORE_TYPE=file
// export HDNS_STATE_STORE_PATH=/var/lib/hdns/state.json
//
// hdnsd
// ```

use anyhow::{Context, Result};
use hdns_core::config::{
    HETZNER_API_BASE, HdnsConfig, IpSourceConfig, ProviderConfig, StateStoreConfig, SyncCheck,
};
use hdns_core::model::{Credential, DEFAULT_TTL, Record};
use hdns_core::traits::{AddressStore, HistoryStore, RecordStore};
use hdns_core::{
    EngineComponents, FileStore, MemoryStore, MultiServerResolver, ProviderRegistry,
    ReconciliationEngine, RefreshSchedule, Scheduler,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum HdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HdnsExitCode> for ExitCode {
    fn from(code: HdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// One managed record from `HDNS_RECORDS`
#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordSpec {
    name: String,
    domain: String,
    zone_id: String,
    ttl: u32,
}

/// Parse `name:domain:zone_id[:ttl]` entries
fn parse_records(raw: &str) -> Result<Vec<RecordSpec>> {
    let mut specs = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();

        let (name, domain, zone_id, ttl) = match parts.as_slice() {
            [name, domain, zone_id] => (*name, *domain, *zone_id, DEFAULT_TTL),
            [name, domain, zone_id, ttl] => {
                let ttl = ttl
                    .parse()
                    .with_context(|| format!("HDNS_RECORDS entry '{}' has an invalid TTL", entry))?;
                (*name, *domain, *zone_id, ttl)
            }
            _ => anyhow::bail!(
                "HDNS_RECORDS entry '{}' must be name:domain:zone_id[:ttl]",
                entry
            ),
        };

        if name.is_empty() || domain.is_empty() || zone_id.is_empty() {
            anyhow::bail!("HDNS_RECORDS entry '{}' has an empty field", entry);
        }
        if ttl == 0 {
            anyhow::bail!("HDNS_RECORDS entry '{}' must have a TTL > 0", entry);
        }

        specs.push(RecordSpec {
            name: name.to_string(),
            domain: domain.to_string(),
            zone_id: zone_id.to_string(),
            ttl,
        });
    }

    Ok(specs)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Application configuration
struct Config {
    core: HdnsConfig,
    provider_type: String,
    api_token: String,
    records: Vec<RecordSpec>,
    state_store_type: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut core = HdnsConfig::default();

        if let Some(refresh) = get("HDNS_REFRESH") {
            core.refresh = refresh;
        }
        if let Some(servers) = get("HDNS_DNS_SERVERS") {
            core.dns_servers = split_list(&servers);
        }
        if let Some(ms) = get("HDNS_QUERY_TIMEOUT_MS") {
            core.resolver.query_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("HDNS_QUERY_TIMEOUT_MS '{}' is not a number", ms))?;
        }
        if let Some(ms) = get("HDNS_RESOLVE_TIMEOUT_MS") {
            core.resolver.total_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("HDNS_RESOLVE_TIMEOUT_MS '{}' is not a number", ms))?;
        }
        if let Some(urls) = get("HDNS_IP_RESOLVERS") {
            core.ip_source = IpSourceConfig::Http {
                urls: split_list(&urls),
                timeout_secs: 10,
            };
        }

        let dry_run = get("HDNS_MODE").unwrap_or_default().to_lowercase() == "dry-run";
        core.provider = ProviderConfig::Hetzner {
            base_url: get("HDNS_PROVIDER_BASE_URL").unwrap_or_else(|| HETZNER_API_BASE.to_string()),
            dry_run,
        };

        let state_store_type = get("HDNS_STATE_STORE_TYPE").unwrap_or_else(|| "file".to_string());
        core.state_store = match state_store_type.as_str() {
            "file" => StateStoreConfig::File {
                path: get("HDNS_STATE_STORE_PATH").unwrap_or_default(),
            },
            _ => StateStoreConfig::Memory,
        };

        if let Some(policy) = get("HDNS_SYNC_CHECK") {
            core.engine.sync_check = match policy.trim() {
                "linked_address" => SyncCheck::LinkedAddress,
                "resolved_value" => SyncCheck::ResolvedValue,
                other => anyhow::bail!(
                    "HDNS_SYNC_CHECK '{}' is not valid. Valid values: linked_address, resolved_value",
                    other
                ),
            };
        }

        Ok(Self {
            core,
            provider_type: get("HDNS_PROVIDER_TYPE").unwrap_or_else(|| "hetzner".to_string()),
            api_token: get("HDNS_API_TOKEN").unwrap_or_default(),
            records: parse_records(&get("HDNS_RECORDS").unwrap_or_default())?,
            state_store_type,
            log_level: get("HDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.provider_type.as_str() {
            "hetzner" => {}
            _ => anyhow::bail!(
                "HDNS_PROVIDER_TYPE '{}' is not supported. Supported providers: hetzner",
                self.provider_type
            ),
        }

        if !self.records.is_empty() {
            if self.api_token.trim().is_empty() {
                anyhow::bail!(
                    "HDNS_API_TOKEN is required when HDNS_RECORDS is set. \
                    Set it via: export HDNS_API_TOKEN=your_token"
                );
            }

            // Check for obvious placeholder tokens (common mistake)
            let token_lower = self.api_token.to_lowercase();
            if token_lower.contains("your_token") || token_lower.contains("replace_me") || token_lower == "token" {
                anyhow::bail!(
                    "HDNS_API_TOKEN appears to be a placeholder. \
                    Use an actual API token from the Hetzner DNS console."
                );
            }
        }

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "HDNS_STATE_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                self.state_store_type
            ),
        }

        if let StateStoreConfig::File { path } = &self.core.state_store {
            if path.is_empty() {
                anyhow::bail!(
                    "HDNS_STATE_STORE_PATH is required when HDNS_STATE_STORE_TYPE=file. \
                    Set it via: export HDNS_STATE_STORE_PATH=/var/lib/hdns/state.json"
                );
            }

            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "HDNS_STATE_STORE_PATH parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HDNS_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.core.validate()?;

        Ok(())
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return HdnsExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HdnsExitCode::ConfigError.into();
    }

    info!("Starting hdnsd daemon");
    info!("Configuration loaded: {} record(s) to seed", config.records.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            HdnsExitCode::RuntimeError
        } else {
            HdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// The three store roles, backed by one store instance
struct Stores {
    addresses: Arc<dyn AddressStore>,
    records: Arc<dyn RecordStore>,
    history: Arc<dyn HistoryStore>,
}

impl Stores {
    fn shared<S>(store: Arc<S>) -> Self
    where
        S: AddressStore + RecordStore + HistoryStore + 'static,
    {
        Self {
            addresses: store.clone(),
            records: store.clone(),
            history: store,
        }
    }

    async fn open(config: &StateStoreConfig) -> Result<Self> {
        Ok(match config {
            StateStoreConfig::File { path } => {
                info!("Using file state store at {}", path);
                let store = FileStore::new(path)
                    .await
                    .with_context(|| format!("Failed to open state file {}", path))?;
                Self::shared(Arc::new(store))
            }
            StateStoreConfig::Memory => {
                warn!("Using in-memory state store; every record is written once after a restart");
                Self::shared(Arc::new(MemoryStore::new()))
            }
        })
    }
}

/// Create or refresh the records named in `HDNS_RECORDS`
async fn seed_records(records: &dyn RecordStore, specs: &[RecordSpec], api_token: &str) -> Result<()> {
    let existing = records.list().await?;

    for spec in specs {
        let credential = Credential::new(api_token);
        let known = existing
            .iter()
            .find(|r| r.name == spec.name && r.zone_id == spec.zone_id);

        match known {
            Some(record) => {
                let mut record = record.clone();
                if record.domain == spec.domain && record.ttl == spec.ttl && record.credential == credential {
                    debug!("Record {} already managed (id {})", record.probe_domain(), record.id);
                    continue;
                }
                record.domain = spec.domain.clone();
                record.ttl = spec.ttl;
                record.credential = credential;
                records.update(&record).await?;
                info!("Updated managed record {} (id {})", record.probe_domain(), record.id);
            }
            None => {
                let record = Record::new(credential, &spec.zone_id, &spec.name, &spec.domain).with_ttl(spec.ttl);
                let record = records.create(record).await?;
                info!("Managing record {} (id {})", record.probe_domain(), record.id);
            }
        }
    }

    Ok(())
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = ProviderRegistry::new();

    info!("Registering Hetzner provider");
    hdns_provider_hetzner::register(&registry);
    info!("Registering HTTP IP source");
    hdns_ip_http::register(&registry);

    let core = config.core;
    let ip_source = registry.create_ip_source(&core.ip_source)?;
    let provider = registry.create_provider(&core.provider)?;
    let stores = Stores::open(&core.state_store).await?;

    seed_records(stores.records.as_ref(), &config.records, &config.api_token).await?;

    let resolver = MultiServerResolver::from_config(core.dns_servers.clone(), &core.resolver);
    info!("DNS servers: {}", core.dns_servers.join(", "));

    let components = EngineComponents {
        ip_source,
        resolver,
        provider,
        addresses: stores.addresses,
        records: stores.records,
        history: stores.history,
    };
    let (engine, mut events) = ReconciliationEngine::new(components, core.engine.clone())?;
    let engine = Arc::new(engine);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    // First cycle right away rather than at the first schedule tick
    match engine.run_cycle().await {
        Ok(report) => info!(
            "Initial cycle finished: {} up-to-date, {} updated, {} failed",
            report.up_to_date, report.updated, report.failed
        ),
        Err(e) => error!("Initial cycle failed: {}", e),
    }

    let schedule = RefreshSchedule::parse(&core.refresh)?;
    let scheduler = Scheduler::new(engine, schedule);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling failed, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    scheduler.run_until(shutdown_rx).await?;

    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
