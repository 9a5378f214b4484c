use std::sync::Arc;
use std::time::Duration;

use carepay_ledger::core::ledger::idempotency::IdempotencyGuard;
use carepay_ledger::core::reconciliation::state::SweepReport;
use carepay_ledger::core::reconciliation::Reconciler;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::NodeConfig;

#[derive(Debug, Clone, Copy)]
pub struct JanitorSettings {
    pub interval: Duration,
    pub run_timeout: Duration,
    pub sweep_after: Duration,
    pub max_age: Duration,
}

impl From<&NodeConfig> for JanitorSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.janitor_interval_secs),
            run_timeout: Duration::from_secs(config.janitor_timeout_secs),
            sweep_after: Duration::from_secs(config.sweep_after_secs),
            max_age: Duration::from_secs(config.pending_max_age_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JanitorReport {
    /// `None` when the sweep failed or timed out.
    pub sweep: Option<SweepReport>,
    pub expired: usize,
}

/// Background upkeep of pending reservations: re-verify them against the
/// provider, then fail the ones that stayed pending too long. A reservation
/// whose verification errored in the same run is kept.
pub struct Janitor {
    reconciler: Arc<Reconciler>,
    guard: Arc<IdempotencyGuard>,
    settings: JanitorSettings,
}

impl Janitor {
    pub fn new(reconciler: Arc<Reconciler>, guard: Arc<IdempotencyGuard>, settings: JanitorSettings) -> Self {
        Self { reconciler, guard, settings }
    }

    pub async fn run_once(&self) -> JanitorReport {
        let mut report = JanitorReport::default();

        // 1. Sweep
        let sweep = self.reconciler.sweep_pending(self.settings.sweep_after);
        match tokio::time::timeout(self.settings.run_timeout, sweep).await {
            Ok(Ok(sweep)) => report.sweep = Some(sweep),
            Ok(Err(e)) => tracing::error!("❌ Pending sweep failed: {}", e),
            Err(_) => tracing::warn!("⚠️ Pending sweep timed out after {:?}", self.settings.run_timeout),
        }

        // 2. Expire
        let unsettled = match &report.sweep {
            Some(sweep) => sweep.unsettled.clone(),
            None => {
                tracing::warn!("⚠️ Expiry skipped: pending reservations were not re-verified");
                return report;
            }
        };
        match self.guard.evict_stale_except(self.settings.max_age, &unsettled) {
            Ok(expired) => report.expired = expired,
            Err(e) => tracing::error!("❌ Reservation expiry failed: {}", e),
        }
        report
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            tracing::info!("🧹 Janitor running every {:?}", self.settings.interval);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
