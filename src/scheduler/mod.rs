//! Periodic check scheduler.
//!
//! Wakes on a fixed interval, snapshots the registry, and fans probes out to
//! workers under two limits: a global semaphore capping in-flight probes and
//! a binary semaphore per host. A cycle always drains its workers before the
//! next one may start.

mod gates;

pub use gates::HostGates;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::canon::host_key;
use crate::db::{CheckResult, Store, Target};
use crate::probe::Prober;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between check cycles.
    pub check_interval: Duration,
    /// Global cap on in-flight probes.
    pub max_concurrency: usize,
}

/// Orchestrates check cycles over the registered targets.
pub struct Scheduler {
    store: Arc<Store>,
    prober: Prober,
    config: SchedulerConfig,
    global_gate: Arc<Semaphore>,
    host_gates: HostGates,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, prober: Prober, config: SchedulerConfig) -> Self {
        let global_gate = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            store,
            prober,
            config,
            global_gate,
            host_gates: HostGates::new(),
        }
    }

    /// Spawn the scheduler loop. The first cycle runs immediately; the
    /// returned handle resolves once the current cycle has drained after
    /// `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.clone().run_cycle(&cancel).await,
            }
        }
    }

    /// One full pass over the registered targets. Returns only after every
    /// worker spawned for this cycle has finished.
    pub async fn run_cycle(self: Arc<Self>, cancel: &CancellationToken) {
        let targets = match self.store.get_all_targets() {
            Ok(targets) => targets,
            Err(err) => {
                tracing::error!(error = %err, "failed to load targets for check cycle");
                return;
            }
        };
        if targets.is_empty() {
            return;
        }

        tracing::info!(target_count = targets.len(), "starting check cycle");

        let mut workers = JoinSet::new();
        for target in targets {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.global_gate.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let scheduler = self.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = permit;
                scheduler.check_target(&target, &cancel).await;
            });
        }

        while workers.join_next().await.is_some() {}
        tracing::info!("check cycle completed");
    }

    /// Probe one target and persist the outcome, serialized with every other
    /// probe of the same host.
    async fn check_target(&self, target: &Target, cancel: &CancellationToken) {
        let parsed = match Url::parse(&target.url) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(
                    target_id = %target.id,
                    url = %target.url,
                    error = %err,
                    "failed to parse target URL"
                );
                return;
            }
        };
        let host = match host_key(&parsed) {
            Some(host) => host,
            None => {
                tracing::error!(target_id = %target.id, url = %target.url, "target URL has no host");
                return;
            }
        };

        let gate = self.host_gates.get(&host).await;
        let _slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            slot = gate.acquire_owned() => match slot {
                Ok(slot) => slot,
                Err(_) => return,
            },
        };

        let checked_at = Utc::now();
        let started = std::time::Instant::now();
        let outcome = self.prober.check(&target.url, cancel).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        // A cancelled probe is abandoned without persisting anything.
        if cancel.is_cancelled() {
            return;
        }

        let result = CheckResult {
            checked_at,
            status_code: outcome.status_code,
            latency_ms,
            error: outcome.error,
        };
        if let Err(err) = self.store.save_check_result(&target.id, &result) {
            tracing::error!(target_id = %target.id, error = %err, "failed to save check result");
            return;
        }

        tracing::debug!(
            target_id = %target.id,
            url = %target.url,
            status = ?result.status_code,
            latency_ms = result.latency_ms,
            error = ?result.error,
            "check completed"
        );
    }
}
