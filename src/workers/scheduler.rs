use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{parse_bool_value, parse_u64_value, ConfigError};
use crate::database::error::StoreError;
use crate::database::models::ScheduledTransaction;
use crate::database::store::{ScheduleStore, WalletStore};
use crate::services::fulfillment::FulfillmentService;
use crate::system_config::{SystemConfig, SystemConfigSource};

/// Allowance for store reads and writes around the upstream calls of one batch.
const SHUTDOWN_STORE_ALLOWANCE: Duration = Duration::from_secs(30);

/// Error recorded when the wallet no longer covers the locked charge.
pub const INSUFFICIENT_BALANCE_AT_EXECUTION: &str = "Insufficient balance at execution time";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that abort a whole cycle. Per-record failures never surface here;
/// they are written to the record itself.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("system settings unavailable: {0}")]
    Settings(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Maximum number of due records fetched per cycle.
    pub batch_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            batch_size: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`, falling back to defaults only for
    /// unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = parse_bool_value(
            "SCHEDULER_ENABLED",
            lookup("SCHEDULER_ENABLED").as_deref(),
            defaults.enabled,
        )?;
        let poll_secs = parse_u64_value(
            "SCHEDULER_POLL_INTERVAL_SECONDS",
            lookup("SCHEDULER_POLL_INTERVAL_SECONDS").as_deref(),
            defaults.poll_interval.as_secs(),
        )?;
        let batch_size = parse_u64_value(
            "SCHEDULER_BATCH_SIZE",
            lookup("SCHEDULER_BATCH_SIZE").as_deref(),
            u64::from(defaults.batch_size),
        )?;
        let batch_size = u32::try_from(batch_size)
            .map_err(|_| ConfigError::InvalidValue("SCHEDULER_BATCH_SIZE".to_string()))?;

        let cfg = Self {
            enabled,
            poll_interval: Duration::from_secs(poll_secs),
            batch_size,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Upper bound on how long an in-flight cycle can take to finish: one
    /// upstream call per record, run one after another.
    pub fn shutdown_grace(&self, upstream_timeout: Duration) -> Duration {
        upstream_timeout
            .saturating_mul(self.batch_size)
            .saturating_add(SHUTDOWN_STORE_ALLOWANCE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_BATCH_SIZE must be > 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_POLL_INTERVAL_SECONDS must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub completed: usize,
    pub failed: usize,
    /// Claimed by another instance first.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Polls for due scheduled purchases and drives each one
/// PENDING -> PROCESSING -> COMPLETED | FAILED. Records within a batch are
/// processed one after another.
pub struct ScheduledPurchaseWorker {
    schedules: Arc<dyn ScheduleStore>,
    wallets: Arc<dyn WalletStore>,
    fulfillment: FulfillmentService,
    settings: Arc<dyn SystemConfigSource>,
    config: SchedulerConfig,
}

impl ScheduledPurchaseWorker {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        wallets: Arc<dyn WalletStore>,
        fulfillment: FulfillmentService,
        settings: Arc<dyn SystemConfigSource>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            schedules,
            wallets,
            fulfillment,
            settings,
            config,
        }
    }

    /// Runs until `shutdown_rx` flips to `true`. A cycle in progress always
    /// finishes before the loop exits.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "scheduled purchase worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        info!("shutdown channel closed, scheduled purchase worker stopping");
                        break;
                    }
                    if *shutdown_rx.borrow() {
                        info!("scheduled purchase worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.run_cycle().await {
                        Ok(report) if report.due > 0 => info!(
                            due = report.due,
                            completed = report.completed,
                            failed = report.failed,
                            skipped = report.skipped,
                            "scheduler cycle finished"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "scheduler cycle failed"),
                    }
                }
            }
        }

        info!("scheduled purchase worker stopped");
    }

    /// One poll: settings are loaded once and shared by every record in the batch.
    pub async fn run_cycle(&self) -> Result<CycleReport, SchedulerError> {
        let settings = self.settings.load().await?;
        let due = self
            .schedules
            .find_due(Utc::now(), i64::from(self.config.batch_size))
            .await?;

        let mut report = CycleReport {
            due: due.len(),
            ..CycleReport::default()
        };

        for record in due {
            // the claim is durable before anything is sent upstream
            match self.schedules.claim(record.id).await {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(schedule_id = %record.id, error = %e, "failed to claim scheduled purchase");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.execute(&record, &settings).await {
                Ok(transaction_id) => {
                    self.finish(record.id, None).await;
                    report.completed += 1;
                    info!(
                        schedule_id = %record.id,
                        user_id = %record.user_id,
                        category = %record.category,
                        transaction_id = %transaction_id,
                        "scheduled purchase completed"
                    );
                }
                Err(message) => {
                    self.finish(record.id, Some(&message)).await;
                    report.failed += 1;
                    warn!(
                        schedule_id = %record.id,
                        user_id = %record.user_id,
                        category = %record.category,
                        error = %message,
                        "scheduled purchase failed"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn execute(
        &self,
        record: &ScheduledTransaction,
        settings: &SystemConfig,
    ) -> Result<Uuid, String> {
        let charge: Decimal = record.request_fields.amount;
        let account = self
            .wallets
            .account(&record.user_id)
            .await
            .map_err(|e| e.to_string())?;
        if account.balance < charge {
            return Err(INSUFFICIENT_BALANCE_AT_EXECUTION.to_string());
        }

        let request = record.to_purchase_request();
        self.fulfillment
            .purchase_at_charge(&request, &record.user_id, charge, settings)
            .await
            .map(|tx| tx.id)
            .map_err(|e| e.to_string())
    }

    /// Moves a PROCESSING record to its terminal state. A failed write leaves
    /// it in PROCESSING for manual reconciliation.
    async fn finish(&self, id: Uuid, error: Option<&str>) {
        let outcome = match error {
            None => self.schedules.complete(id).await,
            Some(message) => self.schedules.fail(id, message).await,
        };
        match outcome {
            Ok(true) => {}
            Ok(false) => warn!(schedule_id = %id, "scheduled purchase was not in PROCESSING"),
            Err(e) => error!(
                schedule_id = %id,
                error = %e,
                "failed to record terminal state; record left in PROCESSING"
            ),
        }
    }
}
