use crate::alert::{AlertEvaluator, AlertOutcome};
use crate::db::TelemetryStore;
use crate::errors::{Error, Result};
use crate::fetch::Fetcher;
use crate::metrics::{
    CYCLE_LATENCY_SECONDS, FETCH_FAILURES_TOTAL, PERSIST_FAILURES_TOTAL, POLLS_TOTAL,
    ROWS_PERSISTED_TOTAL,
};
use crate::normalize::normalize_batch;
use crate::notify::NotifyOutcome;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Cooldown entries older than this many windows are swept.
const SWEEP_RETAIN_WINDOWS: u32 = 2;

/// Summary of one completed cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub persisted: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub alerts_undelivered: usize,
}

impl CycleReport {
    pub fn skipped(&self) -> usize {
        self.received - self.persisted
    }
}

pub struct Poller<S> {
    fetcher: Fetcher,
    store: S,
    alerts: AlertEvaluator,
    interval: Duration,
    sweep_every: u64,
}

impl<S: TelemetryStore> Poller<S> {
    pub fn new(
        fetcher: Fetcher,
        store: S,
        alerts: AlertEvaluator,
        interval: Duration,
        sweep_every: u64,
    ) -> Self {
        Self {
            fetcher,
            store,
            alerts,
            interval,
            sweep_every,
        }
    }

    /// Runs forever. Each cycle finishes before the next starts, and the
    /// sleep between cycles does not depend on how long the cycle took.
    pub async fn run(&self) {
        info!(
            "Starting poller for {} every {:?} (threshold {}°C, cooldown {:?})",
            self.fetcher.url(),
            self.interval,
            self.alerts.threshold_c(),
            self.alerts.cooldown_window()
        );

        let mut tick: u64 = 0;
        loop {
            tick += 1;
            let start = Instant::now();

            match self.run_cycle().await {
                Ok(report) if report.received == 0 => debug!("No data."),
                Ok(report) => info!(
                    "Inserted {} row(s) ({} skipped), {} alert(s) sent, {} suppressed, {} undelivered",
                    report.persisted,
                    report.skipped(),
                    report.alerts_sent,
                    report.alerts_suppressed,
                    report.alerts_undelivered
                ),
                Err(e) => log_cycle_error(&e),
            }
            CYCLE_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

            if self.sweep_every > 0 && tick % self.sweep_every == 0 {
                let retain = self.alerts.cooldown_window() * SWEEP_RETAIN_WINDOWS;
                let removed = self.alerts.sweep_cooldowns(retain);
                if removed > 0 {
                    debug!("Swept {} stale cooldown entries", removed);
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        POLLS_TOTAL.inc();
        let raws = self
            .fetcher
            .fetch()
            .await
            .inspect_err(|_| FETCH_FAILURES_TOTAL.inc())?;
        self.process(&raws).await
    }

    /// Normalize, persist, then evaluate. Alerts are only evaluated for a
    /// batch that was committed.
    pub async fn process(&self, raws: &[Value]) -> Result<CycleReport> {
        let records = normalize_batch(raws);
        let mut report = CycleReport {
            received: raws.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        self.store
            .persist_batch(&records)
            .await
            .inspect_err(|_| PERSIST_FAILURES_TOTAL.inc())?;
        ROWS_PERSISTED_TOTAL.inc_by(records.len() as f64);
        report.persisted = records.len();

        for record in &records {
            match self.alerts.evaluate(record).await {
                AlertOutcome::NoRisk => {}
                AlertOutcome::Suppressed => report.alerts_suppressed += 1,
                AlertOutcome::Dispatched(NotifyOutcome::Sent) => report.alerts_sent += 1,
                AlertOutcome::Dispatched(_) => report.alerts_undelivered += 1,
            }
        }

        Ok(report)
    }
}

fn log_cycle_error(e: &Error) {
    if e.is_fetch() {
        warn!("Fetch failed, retrying next tick: {}", e);
    } else if e.is_persist() {
        error!("Failed to persist batch, records for this cycle are dropped: {}", e);
    } else {
        error!("Poll cycle failed: {}", e);
    }
}
