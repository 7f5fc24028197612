//! Reconciliation engine
//!
//! The ReconciliationEngine is responsible for:
//! - Refreshing the canonical current public address
//! - Learning what each record resolves to, across several DNS servers
//! - Recording resolution history
//! - Writing records through the provider when they are out of date
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   current IP    ┌──────────────────────┐
//! │  IpSource   │────────────────►│ ReconciliationEngine │──── EngineEvent ───►
//! └─────────────┘                 └──────────────────────┘
//!                                            │
//!         ┌──────────────────┬───────────────┼────────────────┐
//!         ▼                  ▼               ▼                ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐
//! │ Multi-server │  │  consensus   │  │   Stores     │  │ ProviderClient │
//! │   resolver   │  │   reduce     │  │ (addr/rec/h) │  │ (find → write) │
//! └──────────────┘  └──────────────┘  └──────────────┘  └────────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Refresh the current address (failure ends the cycle)
//! 2. For each record, in order:
//!    resolve → reduce → record history → decide → write if stale
//! 3. A failing record is logged and the cycle moves on
//!
//! Only one cycle runs at a time. A cycle requested while another is in
//! flight is skipped rather than queued.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::address::parse_ipv4;
use crate::config::{EngineConfig, SyncCheck};
use crate::consensus;
use crate::error::{Error, Result};
use crate::model::{Address, Credential, Record, RecordHistory, Resolution};
use crate::resolver::MultiServerResolver;
use crate::traits::{
    AddressStore, HistoryStore, IpSource, ProviderClient, ProviderRecord, RecordStore, Zone,
};

/// Sync state of a record relative to the current address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Never written by this engine
    Unknown,
    /// Linked to the current address
    Synced,
    /// Linked to an older address
    Stale,
}

impl RecordState {
    pub fn of(record: &Record, current: &Address) -> Self {
        match record.address_id {
            None => RecordState::Unknown,
            Some(id) if id == current.id => RecordState::Synced,
            Some(_) => RecordState::Stale,
        }
    }
}

/// Events emitted by the ReconciliationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A cycle began; the current address is already refreshed
    CycleStarted { records_count: usize },

    /// The current address was refreshed
    AddressRefreshed { address_id: u64, ip: Ipv4Addr },

    /// No provider write was needed
    RecordUpToDate { record_id: u64, domain: String },

    /// The provider record was created or updated
    RecordUpdated {
        record_id: u64,
        domain: String,
        ip: Ipv4Addr,
        created: bool,
    },

    /// Reconciliation of one record failed
    RecordFailed {
        record_id: u64,
        domain: String,
        error: String,
    },

    /// A cycle was requested while another was running
    CycleSkipped,

    /// A cycle completed
    CycleFinished {
        up_to_date: usize,
        updated: usize,
        failed: usize,
    },
}

/// Per-record result of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub record_id: u64,
    pub domain: String,
    pub state: RecordState,
    pub error: Option<String>,
}

/// Summary of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// True when the cycle did not run because another was in flight
    pub skipped: bool,
    pub address: Option<Address>,
    pub up_to_date: usize,
    pub updated: usize,
    pub failed: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// What happened to a record that reconciled without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciled {
    UpToDate,
    Written { created: bool },
}

/// Collaborators the engine is wired from
pub struct EngineComponents {
    pub ip_source: Box<dyn IpSource>,
    pub resolver: MultiServerResolver,
    pub provider: Box<dyn ProviderClient>,
    pub addresses: Arc<dyn AddressStore>,
    pub records: Arc<dyn RecordStore>,
    pub history: Arc<dyn HistoryStore>,
}

/// Whether `believed` should be appended to a record's history
///
/// `latest` is the record's most recent resolution: every entry sharing the
/// newest timestamp. Nothing is written when that resolution holds exactly
/// the believed IPs and is younger than `window`. A changed answer is always
/// a new consecutive entry, including a flip back to an earlier IP.
pub fn should_record_history(
    latest: &[RecordHistory],
    believed: &[Ipv4Addr],
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    let Some(newest) = latest.first() else {
        return true;
    };

    if now.signed_duration_since(newest.resolved_at) >= window {
        return true;
    }

    let recorded: BTreeSet<Ipv4Addr> = latest.iter().map(|entry| entry.resolved_ip).collect();
    let resolved: BTreeSet<Ipv4Addr> = believed.iter().copied().collect();
    recorded != resolved
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationEngine::new()`]
/// 2. Drive with [`ReconciliationEngine::run_cycle()`], usually from a
///    [`Scheduler`](crate::scheduler::Scheduler)
/// 3. Manual operations ([`refresh_record`](Self::refresh_record),
///    [`resolve_record`](Self::resolve_record)) may be called at any time
///
/// ## Threading
///
/// The engine is `Send + Sync` and meant to be shared behind an `Arc`.
pub struct ReconciliationEngine {
    ip_source: Box<dyn IpSource>,
    resolver: MultiServerResolver,
    provider: Box<dyn ProviderClient>,
    addresses: Arc<dyn AddressStore>,
    records: Arc<dyn RecordStore>,
    history: Arc<dyn HistoryStore>,

    sync_check: SyncCheck,
    history_window: chrono::Duration,

    /// Held for the duration of a cycle or a manual record write
    cycle_lock: Mutex<()>,

    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconciliationEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        components: EngineComponents,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            ip_source: components.ip_source,
            resolver: components.resolver,
            provider: components.provider,
            addresses: components.addresses,
            records: components.records,
            history: components.history,
            sync_check: config.sync_check,
            history_window: config.history_dedup_window(),
            cycle_lock: Mutex::new(()),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one reconciliation cycle
    ///
    /// Fails only when the current address cannot be refreshed or the record
    /// list cannot be read. Per-record failures are reported in the
    /// [`CycleReport`].
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            info!("Reconciliation cycle already running, skipping");
            self.emit_event(EngineEvent::CycleSkipped);
            return Ok(CycleReport::skipped());
        };

        let current = self.refresh_address().await?;
        let records = self.records.list().await?;

        self.emit_event(EngineEvent::CycleStarted {
            records_count: records.len(),
        });

        let mut report = CycleReport {
            address: Some(current.clone()),
            ..CycleReport::default()
        };

        // Nothing can be resolved; fail the DNS phase once instead of per record
        let no_servers = self.resolver.servers().is_empty();
        if no_servers && !records.is_empty() {
            error!(
                "No DNS servers configured, skipping all {} records this cycle",
                records.len()
            );
        }

        for record in records {
            let domain = record.probe_domain();

            let result = if no_servers {
                Err(Error::NoServersConfigured)
            } else {
                self.reconcile_record(&record, &current).await
            };

            match result {
                Ok(Reconciled::UpToDate) => {
                    report.up_to_date += 1;
                    report.outcomes.push(RecordOutcome {
                        record_id: record.id,
                        domain: domain.clone(),
                        state: RecordState::Synced,
                        error: None,
                    });
                    self.emit_event(EngineEvent::RecordUpToDate {
                        record_id: record.id,
                        domain,
                    });
                }
                Ok(Reconciled::Written { created }) => {
                    report.updated += 1;
                    report.outcomes.push(RecordOutcome {
                        record_id: record.id,
                        domain: domain.clone(),
                        state: RecordState::Synced,
                        error: None,
                    });
                    self.emit_event(EngineEvent::RecordUpdated {
                        record_id: record.id,
                        domain,
                        ip: current.ip,
                        created,
                    });
                }
                Err(e) => {
                    if !no_servers {
                        error!("Failed to reconcile record {} (id {}): {}", domain, record.id, e);
                    }
                    report.failed += 1;
                    report.outcomes.push(RecordOutcome {
                        record_id: record.id,
                        domain: domain.clone(),
                        state: RecordState::of(&record, &current),
                        error: Some(e.to_string()),
                    });
                    self.emit_event(EngineEvent::RecordFailed {
                        record_id: record.id,
                        domain,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.emit_event(EngineEvent::CycleFinished {
            up_to_date: report.up_to_date,
            updated: report.updated,
            failed: report.failed,
        });

        Ok(report)
    }

    /// Determine the public IP and make its address the current one
    ///
    /// The current flag is reassigned even when the IP did not change.
    pub async fn refresh_address(&self) -> Result<Address> {
        let ip = self.ip_source.current().await?;
        let address = self.addresses.upsert_by_ip(ip).await?;
        self.addresses.set_current(address.id).await?;

        info!("Current public address: {}", ip);
        self.emit_event(EngineEvent::AddressRefreshed {
            address_id: address.id,
            ip,
        });

        Ok(Address {
            current: true,
            ..address
        })
    }

    /// Force a provider write for one record, regardless of what DNS says
    ///
    /// Waits for a running cycle to finish first.
    pub async fn refresh_record(&self, record_id: u64) -> Result<Record> {
        let _guard = self.cycle_lock.lock().await;

        let record = self
            .records
            .get(record_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {}", record_id)))?;

        let current = self.refresh_address().await?;
        let created = self.write_record(&record, &current).await?;

        self.emit_event(EngineEvent::RecordUpdated {
            record_id,
            domain: record.probe_domain(),
            ip: current.ip,
            created,
        });

        self.records
            .get(record_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {}", record_id)))
    }

    /// Query every DNS server for a record's probe domain
    pub async fn resolve_record(&self, record_id: u64) -> Result<Vec<Resolution>> {
        let record = self
            .records
            .get(record_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("record {}", record_id)))?;

        self.resolver.resolve(&record.probe_domain()).await
    }

    /// Zones visible to a credential
    pub async fn list_zones(&self, credential: &Credential) -> Result<Vec<Zone>> {
        self.provider.list_zones(credential).await
    }

    async fn reconcile_record(&self, record: &Record, current: &Address) -> Result<Reconciled> {
        let domain = record.probe_domain();

        let linked = match record.address_id {
            Some(id) => self.addresses.get(id).await?,
            None => None,
        };

        let resolutions = self.resolver.resolve(&domain).await?;
        let believed = consensus::reduce(&resolutions);
        if believed.is_empty() {
            return Err(Error::no_consensus(&domain));
        }

        let believed: Vec<Ipv4Addr> = believed
            .iter()
            .map(|raw| parse_ipv4(raw))
            .collect::<Result<_>>()?;
        debug!("{} resolves to {:?}", domain, believed);

        if let Err(e) = self.track_resolution(record, &believed, Utc::now()).await {
            warn!("Failed to record resolution history for {}: {}", domain, e);
        }

        if self.is_up_to_date(linked.as_ref(), current, &believed) {
            info!("DNS record {} is already up-to-date with address {}", domain, current.ip);
            return Ok(Reconciled::UpToDate);
        }

        let created = self.write_record(record, current).await?;
        Ok(Reconciled::Written { created })
    }

    fn is_up_to_date(&self, linked: Option<&Address>, current: &Address, believed: &[Ipv4Addr]) -> bool {
        match self.sync_check {
            SyncCheck::LinkedAddress => linked.is_some_and(|a| a.ip == current.ip),
            SyncCheck::ResolvedValue => linked.is_some() && believed.contains(&current.ip),
        }
    }

    async fn track_resolution(
        &self,
        record: &Record,
        believed: &[Ipv4Addr],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let latest = match self.history.last_for(record.id).await? {
            Some(last) => self
                .history
                .list_for(record.id)
                .await?
                .into_iter()
                .filter(|entry| entry.resolved_at == last.resolved_at)
                .collect(),
            None => Vec::new(),
        };

        if !should_record_history(&latest, believed, now, self.history_window) {
            return Ok(());
        }

        // One timestamp for the whole answer so it reads back as one resolution
        for ip in believed {
            let address = self.addresses.upsert_by_ip(*ip).await?;
            self.history.append(record.id, address.id, *ip, now).await?;
        }
        Ok(())
    }

    /// Find-then-create/update at the provider, then link the record
    ///
    /// Returns whether the provider record had to be created.
    async fn write_record(&self, record: &Record, current: &Address) -> Result<bool> {
        let domain = record.probe_domain();
        let provider = self.provider.provider_name();

        let existing = self
            .provider
            .find_record(&record.credential, &record.zone_id, &record.name, record.record_type)
            .await?;

        let created = match existing {
            None => {
                let desired = ProviderRecord::desired(
                    record.zone_id.clone(),
                    record.record_type,
                    record.name.clone(),
                    current.ip,
                    record.ttl,
                );
                self.provider.create_record(&record.credential, &desired).await?;
                info!("Created {} record {} -> {} at {}", record.record_type, domain, current.ip, provider);
                true
            }
            Some(found) => {
                let desired = found.with_value(current.ip, record.ttl);
                self.provider.update_record(&record.credential, &desired).await?;
                info!("Updated {} record {} -> {} at {}", record.record_type, domain, current.ip, provider);
                false
            }
        };

        let mut linked = record.clone();
        linked.address_id = Some(current.id);
        linked.last_update = Some(Utc::now());
        self.records.update(&linked).await?;

        Ok(created)
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
