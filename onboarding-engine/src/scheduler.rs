//! Recurring automation scans.
//!
//! The scheduler is owned by the service process. Each timer tick starts a
//! scan on its own tokio task; a tick that finds the previous scan still
//! running is skipped rather than overlapping it. Each tick also drops hire
//! locks that nobody holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::automation::{AutomationEngine, ScanReport};

/// Result of one scheduler tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(ScanReport),
    /// A scan was already in flight
    Skipped,
    Failed(String),
}

#[derive(Clone)]
pub struct AutomationScheduler {
    automation: Arc<AutomationEngine>,
    period: Duration,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the scan ends, even on panic
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutomationScheduler {
    pub fn new(automation: Arc<AutomationEngine>, period: Duration) -> Self {
        Self {
            automation,
            period,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> Option<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(Arc::clone(&self.in_flight)))
    }

    /// Run one scan now unless one is already running
    pub async fn trigger_now(&self) -> TickOutcome {
        let Some(_in_flight) = self.begin() else {
            debug!("Automation scan still running, skipping tick");
            return TickOutcome::Skipped;
        };

        let outcome = self.automation.scan().await;
        let pruned = self.automation.lifecycle().locks().prune().await;
        debug!(pruned, "Pruned idle hire locks");

        match outcome {
            Ok(report) => {
                info!(
                    rules = report.rules_evaluated,
                    tasks = report.tasks_examined,
                    overdue = report.overdue_marked,
                    actions = report.actions_fired,
                    failures = report.failures,
                    "Automation scan finished"
                );
                TickOutcome::Completed(report)
            }
            Err(e) => {
                warn!(error = %e, "Automation scan failed");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tick until `shutdown` is cancelled. The first scan runs immediately.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.period.as_secs(),
            "Automation scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Automation scheduler stopping");
                    break;
                }
                _ = timer.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.trigger_now().await;
                    });
                }
            }
        }
    }

    /// Run the scheduler on its own task
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(self.run(shutdown)).await {
                error!(error = ?e, "Automation scheduler task panicked");
            }
        })
    }
}
