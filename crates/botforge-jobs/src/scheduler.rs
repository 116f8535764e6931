//! Due-work scheduler.
//!
//! A periodic scan that discovers overdue leads and schedules reminders for
//! them, then runs delivery attempts for every due reminder and webhook
//! delivery. Per-item failures are logged and skipped so one bad row never
//! stalls the scan.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, instrument};

use botforge_core::defaults::{SCHEDULER_BATCH_SIZE, SCHEDULER_SCAN_INTERVAL_SECS};
use botforge_core::sla::truncate_to_minute;
use botforge_core::{Error, Result};
use botforge_db::Database;

use crate::delivery::{ReminderDeliverer, WebhookDeliverer};

/// Reason recorded on reminders created by the SLA scan. Part of the dedup
/// key, so renaming it would re-schedule existing reminders.
pub const REMINDER_REASON_SLA: &str = "sla_overdue";

/// Configuration for the due-work scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between scans.
    pub scan_interval: Duration,
    /// Maximum rows picked up per scan pass.
    pub batch_size: i64,
    /// Whether to run the scheduler at all.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(SCHEDULER_SCAN_INTERVAL_SECS),
            batch_size: SCHEDULER_BATCH_SIZE,
            enabled: true,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SCHEDULER_ENABLED` | `true` | Enable/disable the scan loop |
    /// | `SCHEDULER_SCAN_INTERVAL_SECS` | `300` | Seconds between scans |
    /// | `SCHEDULER_BATCH_SIZE` | `200` | Max rows per scan pass |
    pub fn from_env() -> Self {
        let enabled = std::env::var("SCHEDULER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let scan_interval_secs = std::env::var("SCHEDULER_SCAN_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(SCHEDULER_SCAN_INTERVAL_SECS);

        let batch_size = std::env::var("SCHEDULER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(SCHEDULER_BATCH_SIZE)
            .max(1);

        Self {
            scan_interval: Duration::from_secs(scan_interval_secs),
            batch_size,
            enabled,
        }
    }
}

/// Counts from one scheduler pass, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub reminders_scheduled: usize,
    pub reminders_attempted: usize,
    pub webhooks_attempted: usize,
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }
}

/// Periodic due-work scanner.
pub struct Scheduler {
    db: Database,
    webhooks: WebhookDeliverer,
    reminders: Arc<ReminderDeliverer>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        db: Database,
        webhooks: WebhookDeliverer,
        reminders: Arc<ReminderDeliverer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            webhooks,
            reminders,
            config,
        }
    }

    /// Start the scan loop and return a handle for control.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        SchedulerHandle { shutdown_tx }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = "scheduler",
                "Scheduler is disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = "scheduler",
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Scheduler started"
        );

        loop {
            if let Err(e) = self.tick().await {
                error!(
                    subsystem = "scheduler",
                    error = %e,
                    "Scheduler pass failed"
                );
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "scheduler", "Scheduler received shutdown signal");
                    break;
                }
                _ = sleep(self.config.scan_interval) => {}
            }
        }

        info!(subsystem = "scheduler", "Scheduler stopped");
    }

    /// Run one full pass: schedule reminders for overdue leads, then run
    /// delivery attempts for everything due.
    pub async fn tick(&self) -> Result<TickStats> {
        let start = Instant::now();
        let mut stats = TickStats::default();

        stats.reminders_scheduled = self.schedule_due_reminders().await?;
        stats.reminders_attempted = self.deliver_due_reminders().await?;
        stats.webhooks_attempted = self.deliver_due_webhooks().await?;

        info!(
            subsystem = "scheduler",
            op = "tick",
            reminders_scheduled = stats.reminders_scheduled,
            reminders_attempted = stats.reminders_attempted,
            webhooks_attempted = stats.webhooks_attempted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scheduler pass complete"
        );
        Ok(stats)
    }

    async fn schedule_due_reminders(&self) -> Result<usize> {
        let now = Utc::now();
        let leads = self.db.leads.due_leads(now, self.config.batch_size).await?;

        let mut scheduled = 0;
        for lead in leads {
            let deadline = match lead.next_action_at {
                Some(at) => truncate_to_minute(at),
                None => continue,
            };
            match self
                .db
                .reminders
                .schedule_for_lead(lead.id, REMINDER_REASON_SLA, deadline, now)
                .await
            {
                Ok(Some(_)) => scheduled += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(
                        subsystem = "scheduler",
                        op = "schedule",
                        lead_id = %lead.id,
                        error = %e,
                        "Failed to schedule reminder"
                    );
                }
            }
        }
        Ok(scheduled)
    }

    async fn deliver_due_reminders(&self) -> Result<usize> {
        let due = self
            .db
            .reminders
            .claim_due(Utc::now(), self.config.batch_size)
            .await?;

        let mut attempted = 0;
        for reminder in &due {
            match self.reminders.attempt(reminder).await {
                Ok(_) => attempted += 1,
                Err(e) => {
                    error!(
                        subsystem = "scheduler",
                        op = "deliver_reminder",
                        reminder_id = %reminder.id,
                        error = %e,
                        "Reminder attempt errored"
                    );
                }
            }
        }
        Ok(attempted)
    }

    async fn deliver_due_webhooks(&self) -> Result<usize> {
        let due = self
            .db
            .webhooks
            .claim_due(Utc::now(), self.config.batch_size)
            .await?;

        let mut attempted = 0;
        for delivery in &due {
            match self.webhooks.attempt(delivery).await {
                Ok(_) => attempted += 1,
                Err(e) => {
                    error!(
                        subsystem = "scheduler",
                        op = "deliver_webhook",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Webhook attempt errored"
                    );
                }
            }
        }
        Ok(attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(300));
        assert_eq!(config.batch_size, 200);
        assert!(config.enabled);
    }

    #[test]
    fn test_reason_is_stable() {
        assert_eq!(REMINDER_REASON_SLA, "sla_overdue");
    }
}
