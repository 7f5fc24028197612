//! Test doubles and common utilities for engine contract tests
//!
//! The doubles share their state through `Arc`s, so a test keeps a clone as
//! a handle while the engine owns the boxed original.

#![allow(dead_code)]

use async_trait::async_trait;
use hdns_core::config::EngineConfig;
use hdns_core::error::{Error, Result};
use hdns_core::model::{Credential, Record, RecordType};
use hdns_core::resolver::{MultiServerResolver, NameServerQuery};
use hdns_core::traits::{IpSource, ProviderClient, ProviderRecord, RecordStore, Zone};
use hdns_core::{EngineComponents, EngineEvent, MemoryStore, ReconciliationEngine};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TOKEN: &str = "test-token";

pub fn ip(raw: &str) -> Ipv4Addr {
    raw.parse().unwrap()
}

/// An IpSource whose answer the test controls
#[derive(Clone)]
pub struct FakeIpSource {
    answer: Arc<Mutex<Option<Ipv4Addr>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeIpSource {
    pub fn new(current: Ipv4Addr) -> Self {
        Self {
            answer: Arc::new(Mutex::new(Some(current))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, current: Ipv4Addr) {
        *self.answer.lock().unwrap() = Some(current);
    }

    /// Make every following call fail
    pub fn fail(&self) {
        *self.answer.lock().unwrap() = None;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for FakeIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock().unwrap();
        answer.ok_or_else(|| Error::resolution("no IP resolver returned a usable address"))
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

/// What a fake DNS server does when asked
#[derive(Debug, Clone)]
pub enum Answer {
    Ips(Vec<String>),
    Fail,
    Hang,
}

/// Per-server canned DNS answers, with optional per-domain overrides
#[derive(Clone, Default)]
pub struct FakeNameServers {
    answers: Arc<Mutex<HashMap<String, Answer>>>,
    domains: Arc<Mutex<HashMap<String, Vec<String>>>>,
    queries: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeNameServers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, server: &str, answer: Answer) {
        self.answers.lock().unwrap().insert(server.to_string(), answer);
    }

    /// Every listed server answers with `ips`
    pub fn answer_all(&self, servers: &[&str], ips: &[&str]) {
        let ips: Vec<String> = ips.iter().map(|s| s.to_string()).collect();
        for server in servers {
            self.set(server, Answer::Ips(ips.clone()));
        }
    }

    /// Every server answers `domain` with `ips`, whatever else it is set to
    pub fn answer_domain(&self, domain: &str, ips: &[&str]) {
        let ips = ips.iter().map(|s| s.to_string()).collect();
        self.domains.lock().unwrap().insert(domain.to_string(), ips);
    }

    /// (server, domain) pairs in the order they were queried
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NameServerQuery for FakeNameServers {
    async fn query(&self, server: &str, domain: &str) -> Result<Vec<String>> {
        self.queries
            .lock()
            .unwrap()
            .push((server.to_string(), domain.to_string()));

        if let Some(ips) = self.domains.lock().unwrap().get(domain).cloned() {
            return Ok(ips);
        }

        let answer = self.answers.lock().unwrap().get(server).cloned();
        match answer {
            Some(Answer::Ips(ips)) => Ok(ips),
            Some(Answer::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Some(Answer::Fail) | None => Err(Error::dns(format!("SERVFAIL from {}", server))),
        }
    }
}

/// A provider that keeps records in memory and counts calls
#[derive(Clone, Default)]
pub struct MockProvider {
    records: Arc<Mutex<HashMap<(String, String), ProviderRecord>>>,
    zones: Arc<Mutex<Vec<Zone>>>,
    failing_zones: Arc<Mutex<Vec<String>>>,
    find_delay: Arc<Mutex<Duration>>,
    find_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes to this zone fail with a provider error
    pub fn fail_zone(&self, zone_id: &str) {
        self.failing_zones.lock().unwrap().push(zone_id.to_string());
    }

    pub fn set_find_delay(&self, delay: Duration) {
        *self.find_delay.lock().unwrap() = delay;
    }

    pub fn add_zone(&self, id: &str, name: &str) {
        self.zones.lock().unwrap().push(Zone {
            id: id.to_string(),
            name: name.to_string(),
            records_count: 0,
        });
    }

    pub fn record(&self, zone_id: &str, name: &str) -> Option<ProviderRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(zone_id.to_string(), name.to_string()))
            .cloned()
    }

    pub fn find_count(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.create_count() + self.update_count()
    }

    fn check(&self, credential: &Credential, zone_id: &str) -> Result<()> {
        if credential.expose() != TOKEN {
            return Err(Error::provider("mock", "invalid token"));
        }
        if self.failing_zones.lock().unwrap().iter().any(|z| z == zone_id) {
            return Err(Error::provider("mock", format!("zone {} is locked", zone_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn find_record(
        &self,
        credential: &Credential,
        zone_id: &str,
        name: &str,
        _record_type: RecordType,
    ) -> Result<Option<ProviderRecord>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.find_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(credential, zone_id)?;
        Ok(self.record(zone_id, name))
    }

    async fn create_record(
        &self,
        credential: &Credential,
        record: &ProviderRecord,
    ) -> Result<ProviderRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(credential, &record.zone_id)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut created = record.clone();
        created.id = Some(format!("rec-{}", id));
        self.records.lock().unwrap().insert(
            (created.zone_id.clone(), created.name.clone()),
            created.clone(),
        );
        Ok(created)
    }

    async fn update_record(
        &self,
        credential: &Credential,
        record: &ProviderRecord,
    ) -> Result<ProviderRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check(credential, &record.zone_id)?;

        if record.id.is_none() {
            return Err(Error::provider("mock", "update without id"));
        }
        self.records.lock().unwrap().insert(
            (record.zone_id.clone(), record.name.clone()),
            record.clone(),
        );
        Ok(record.clone())
    }

    async fn list_zones(&self, credential: &Credential) -> Result<Vec<Zone>> {
        if credential.expose() != TOKEN {
            return Err(Error::provider("mock", "invalid token"));
        }
        Ok(self.zones.lock().unwrap().clone())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A record in `zone-1` of `example.com`
pub fn test_record(name: &str) -> Record {
    Record::new(Credential::new(TOKEN), "zone-1", name, "example.com")
}

/// Engine wired to fakes, plus handles to every fake
pub struct Harness {
    pub engine: Arc<ReconciliationEngine>,
    pub events: mpsc::Receiver<EngineEvent>,
    pub store: MemoryStore,
    pub ip_source: FakeIpSource,
    pub dns: FakeNameServers,
    pub provider: MockProvider,
}

impl Harness {
    pub fn new(servers: &[&str], current: Ipv4Addr, config: EngineConfig) -> Self {
        Self::with_store(servers, current, config, MemoryStore::new())
    }

    pub fn with_store(
        servers: &[&str],
        current: Ipv4Addr,
        config: EngineConfig,
        store: MemoryStore,
    ) -> Self {
        let ip_source = FakeIpSource::new(current);
        let dns = FakeNameServers::new();
        let provider = MockProvider::new();

        let resolver = MultiServerResolver::new(
            servers.iter().map(|s| s.to_string()).collect(),
            Arc::new(dns.clone()),
        )
        .with_total_timeout(Duration::from_millis(300));

        let components = EngineComponents {
            ip_source: Box::new(ip_source.clone()),
            resolver,
            provider: Box::new(provider.clone()),
            addresses: Arc::new(store.clone()),
            records: Arc::new(store.clone()),
            history: Arc::new(store.clone()),
        };

        let (engine, events) =
            ReconciliationEngine::new(components, config).expect("engine construction succeeds");

        Self {
            engine: Arc::new(engine),
            events,
            store,
            ip_source,
            dns,
            provider,
        }
    }

    pub async fn add_record(&self, name: &str) -> Record {
        self.store
            .create(test_record(name))
            .await
            .expect("record creation succeeds")
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
