//! Cron-driven refresh loop
//!
//! The scheduler sleeps until the next fire time of the refresh expression,
//! runs one reconciliation cycle and repeats. Cycles never overlap: the next
//! sleep is computed only after the running cycle returns, so fire times
//! that pass during a long cycle are coalesced.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::engine::ReconciliationEngine;
use crate::error::{Error, Result};

/// A parsed refresh expression
///
/// Expressions carry a leading seconds field: `sec min hour dom month dow
/// [year]`, e.g. `*/30 * * * * *` for every thirty seconds.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    expression: String,
    schedule: Schedule,
}

impl RefreshSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let fields = trimmed.split_whitespace().count();
        if !trimmed.starts_with('@') && !(6..=7).contains(&fields) {
            return Err(Error::config(format!(
                "refresh schedule '{}' must have 6 or 7 fields starting with seconds",
                expression
            )));
        }

        let schedule = Schedule::from_str(trimmed).map_err(|e| {
            Error::config(format!("invalid refresh schedule '{}': {}", expression, e))
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Time to wait from `now` until the next fire time
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.next_after(now)?;
        Some(next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Runs reconciliation cycles on a [`RefreshSchedule`]
pub struct Scheduler {
    engine: Arc<ReconciliationEngine>,
    schedule: RefreshSchedule,
}

impl Scheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, schedule: RefreshSchedule) -> Self {
        Self { engine, schedule }
    }

    /// Run until CTRL-C
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run until `shutdown_rx` fires or its sender is dropped
    pub async fn run_until(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        info!("Refresh schedule: {}", self.schedule.expression());

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            let Some(delay) = self.schedule.delay_from(Utc::now()) else {
                warn!("Refresh schedule has no upcoming fire time, stopping");
                break;
            };
            debug!("Next refresh in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, scheduler stopped");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn tick(&self) {
        match self.engine.run_cycle().await {
            Ok(report) if report.skipped => {
                debug!("Refresh tick skipped, a cycle is already running");
            }
            Ok(report) => {
                info!(
                    "Refresh cycle finished: {} up-to-date, {} updated, {} failed",
                    report.up_to_date, report.updated, report.failed
                );
            }
            Err(e) => {
                error!("Refresh cycle failed: {}", e);
            }
        }
    }
}
