//! Ingestion job worker.
//!
//! Polls the queue for ingestion jobs and runs them concurrently with a
//! per-job timeout. Emits broadcast events so dashboards and tests can
//! observe job lifecycles without polling the database.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use botforge_core::defaults::{
    ERROR_CODE_INGESTION_FAILED, EVENT_BUS_CAPACITY, JOB_MAX_CONCURRENT, JOB_POLL_INTERVAL_MS,
    JOB_TIMEOUT_SECS,
};
use botforge_core::{Error, IngestionJob, Result};
use botforge_db::Database;

use crate::ingestion::{IngestionRunner, RunOutcome};

/// Configuration for the ingestion worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrently running jobs.
    pub max_concurrent_jobs: usize,
    /// Per-job execution timeout.
    pub job_timeout: Duration,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: JOB_MAX_CONCURRENT,
            job_timeout: Duration::from_secs(JOB_TIMEOUT_SECS),
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `600` | Per-job execution timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(JOB_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(JOB_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            job_timeout: Duration::from_secs(job_timeout_secs),
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the ingestion worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was picked up for execution.
    JobStarted { job_id: Uuid, source_id: Uuid },
    /// A job completed successfully.
    JobSucceeded { job_id: Uuid, chunk_count: usize },
    /// A job failed terminally.
    JobFailed { job_id: Uuid, error_code: String },
    /// A job was skipped (already succeeded or owned elsewhere).
    JobSkipped { job_id: Uuid },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that drains the ingestion job queue.
pub struct JobWorker {
    db: Database,
    runner: IngestionRunner,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(db: Database, runner: IngestionRunner, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            db,
            runner,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them
    /// concurrently. Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Ingestion worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Ingestion worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Ingestion worker received shutdown signal");
                break;
            }

            let batch = match self
                .db
                .ingestion
                .claim_queued(self.config.max_concurrent_jobs as i64)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Failed to claim jobs");
                    Vec::new()
                }
            };

            if batch.is_empty() {
                // Queue empty, sleep before polling again
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Ingestion worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
                continue;
            }

            debug!(claimed = batch.len(), "Processing concurrent job batch");

            let mut tasks = tokio::task::JoinSet::new();
            for job in batch {
                let runner = self.runner.clone();
                let db = self.db.clone();
                let event_tx = self.event_tx.clone();
                let job_timeout = self.config.job_timeout;
                tasks.spawn(async move {
                    execute_job(runner, db, event_tx, job, job_timeout).await;
                });
            }

            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = ?e, "Job task panicked");
                }
            }
            // No sleep: immediately try to claim more jobs
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Ingestion worker stopped");
    }
}

/// Execute a single claimed job with a timeout.
async fn execute_job(
    runner: IngestionRunner,
    db: Database,
    event_tx: broadcast::Sender<WorkerEvent>,
    job: IngestionJob,
    job_timeout: Duration,
) {
    let start = Instant::now();
    info!(
        job_id = %job.id,
        source_id = %job.source_id,
        tenant_id = %job.tenant_id,
        "Processing ingestion job"
    );
    let _ = event_tx.send(WorkerEvent::JobStarted {
        job_id: job.id,
        source_id: job.source_id,
    });

    let outcome = match timeout(job_timeout, runner.run(&job)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(job_id = %job.id, error = %e, "Ingestion job errored");
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id: job.id,
                error_code: ERROR_CODE_INGESTION_FAILED.to_string(),
            });
            return;
        }
        Err(_) => {
            error!(
                job_id = %job.id,
                timeout_secs = job_timeout.as_secs(),
                "Ingestion job timed out"
            );
            if let Err(e) = db
                .ingestion
                .mark_failed(job.id, ERROR_CODE_INGESTION_FAILED, "job execution timed out")
                .await
            {
                error!(job_id = %job.id, error = %e, "Failed to record job timeout");
            }
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id: job.id,
                error_code: ERROR_CODE_INGESTION_FAILED.to_string(),
            });
            return;
        }
    };

    match outcome {
        RunOutcome::Succeeded { chunk_count } => {
            info!(
                job_id = %job.id,
                chunk_count = chunk_count,
                duration_ms = start.elapsed().as_millis() as u64,
                "Ingestion job completed"
            );
            let _ = event_tx.send(WorkerEvent::JobSucceeded {
                job_id: job.id,
                chunk_count,
            });
        }
        RunOutcome::Failed { error_code } => {
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id: job.id,
                error_code,
            });
        }
        RunOutcome::AlreadySucceeded | RunOutcome::Skipped => {
            let _ = event_tx.send(WorkerEvent::JobSkipped { job_id: job.id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout, Duration::from_secs(600));
        assert!(config.enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(100)
            .with_max_concurrent(8)
            .with_enabled(false);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert!(!config.enabled);
    }
}
