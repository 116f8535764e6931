//! Ingestion job repository implementation.
//!
//! Jobs are append-only: a job row is never deleted, and once it reaches a
//! terminal status the only way to reprocess a source is to enqueue a new
//! job. All state transitions happen under row locks so concurrent workers
//! cannot double-run the same job.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use botforge_core::defaults::ERROR_MESSAGE_MAX_CHARS;
use botforge_core::{Error, IngestStage, IngestionJob, JobStatus, Result};

/// Outcome of attempting to start a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    /// The job transitioned to running; the caller owns its execution.
    Started,
    /// The job already succeeded. Reprocessing is a no-op, not an error.
    AlreadySucceeded,
    /// Another worker holds the job (running) or it failed terminally.
    Conflict,
}

/// PostgreSQL repository for ingestion jobs.
#[derive(Clone)]
pub struct PgIngestionJobRepository {
    pool: Pool<Postgres>,
}

impl PgIngestionJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> IngestionJob {
        IngestionJob {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            source_id: row.get("source_id"),
            idempotency_key: row.get("idempotency_key"),
            status: JobStatus::from_str_lossy(row.get("status")),
            stage: IngestStage::from_str_lossy(row.get("stage")),
            progress_percent: row.get("progress_percent"),
            attempts: row.get("attempts"),
            error_code: row.get("error_code"),
            error_message: row.get("error_message"),
            last_error_at: row.get("last_error_at"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Fetch a job by id, failing with `JobNotFound` when absent.
    pub async fn get(&self, id: Uuid) -> Result<IngestionJob> {
        let row = sqlx::query("SELECT * FROM ingestion_job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_row).ok_or(Error::JobNotFound(id))
    }

    /// Enqueue an ingestion job, deduplicated by idempotency key.
    ///
    /// Returns the job row plus whether this call created it. With a
    /// non-empty key, a concurrent or repeated call for the same
    /// (tenant, source, key) attaches to the existing job (`created` =
    /// false) instead of creating a second one. An empty key always creates
    /// a fresh job.
    pub async fn create_or_get(
        &self,
        tenant_id: Uuid,
        source_id: Uuid,
        idempotency_key: &str,
    ) -> Result<(IngestionJob, bool)> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        if idempotency_key.is_empty() {
            sqlx::query(
                "INSERT INTO ingestion_job
                     (id, tenant_id, source_id, idempotency_key, status, stage,
                      progress_percent, attempts, error_code, error_message,
                      created_at, updated_at)
                 VALUES ($1, $2, $3, '', 'queued', 'queued', 0, 0, '', '', $4, $4)",
            )
            .bind(id)
            .bind(tenant_id)
            .bind(source_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            return Ok((self.get(id).await?, true));
        }

        // The partial unique index absorbs the race; losers re-select the
        // winner's row.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO ingestion_job
                 (id, tenant_id, source_id, idempotency_key, status, stage,
                  progress_percent, attempts, error_code, error_message,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'queued', 'queued', 0, 0, '', '', $5, $5)
             ON CONFLICT (tenant_id, source_id, idempotency_key)
                 WHERE idempotency_key <> ''
                 DO NOTHING
             RETURNING id",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(source_id)
        .bind(idempotency_key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(id) = inserted {
            return Ok((self.get(id).await?, true));
        }

        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM ingestion_job
             WHERE tenant_id = $1 AND source_id = $2 AND idempotency_key = $3",
        )
        .bind(tenant_id)
        .bind(source_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let existing_id = existing.ok_or_else(|| {
            Error::Internal("idempotent insert lost race but no existing job found".to_string())
        })?;
        Ok((self.get(existing_id).await?, false))
    }

    /// Lock the job row and decide whether this worker may run it.
    ///
    /// Re-checks the status under `FOR UPDATE` so a job that succeeded
    /// between enqueue and pickup becomes a no-op instead of a duplicate
    /// run. Starting increments `attempts` and moves the job to
    /// running/cleanup.
    pub async fn begin_run(&self, id: Uuid) -> Result<RunDecision> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query("SELECT status FROM ingestion_job WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let status = match row {
            Some(row) => JobStatus::from_str_lossy(row.get("status")),
            None => return Err(Error::JobNotFound(id)),
        };

        let decision = match status {
            JobStatus::Succeeded => RunDecision::AlreadySucceeded,
            JobStatus::Running | JobStatus::Failed => RunDecision::Conflict,
            JobStatus::Queued => {
                let now = Utc::now();
                sqlx::query(
                    "UPDATE ingestion_job
                     SET status = 'running', stage = 'cleanup', progress_percent = $2,
                         attempts = attempts + 1, started_at = $3, updated_at = $3
                     WHERE id = $1",
                )
                .bind(id)
                .bind(IngestStage::Cleanup.progress_percent())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                RunDecision::Started
            }
        };

        tx.commit().await.map_err(Error::Database)?;
        Ok(decision)
    }

    /// Advance a running job to the given pipeline stage.
    ///
    /// Each stage write commits independently so observers polling the job
    /// row see progress mid-run.
    pub async fn set_stage(&self, id: Uuid, stage: IngestStage) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ingestion_job
             SET stage = $2, progress_percent = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(stage.as_str())
        .bind(stage.progress_percent())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(id));
        }
        Ok(())
    }

    /// Mark a job terminally succeeded.
    pub async fn mark_succeeded(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE ingestion_job
             SET status = 'succeeded', stage = 'done', progress_percent = 100,
                 error_code = '', error_message = '', finished_at = $2, updated_at = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(id));
        }
        Ok(())
    }

    /// Mark a job terminally failed with an error code and message.
    ///
    /// The message is truncated so a pathological upstream error cannot
    /// bloat the row.
    pub async fn mark_failed(&self, id: Uuid, error_code: &str, error_message: &str) -> Result<()> {
        let message: String = error_message.chars().take(ERROR_MESSAGE_MAX_CHARS).collect();
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE ingestion_job
             SET status = 'failed', stage = 'failed', error_code = $2,
                 error_message = $3, last_error_at = $4, finished_at = $4, updated_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_code)
        .bind(&message)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::JobNotFound(id));
        }
        Ok(())
    }

    /// Pick up queued jobs for execution, oldest first.
    ///
    /// `SKIP LOCKED` lets concurrent workers each grab a disjoint batch;
    /// `begin_run` arbitrates any residual overlap.
    pub async fn claim_queued(&self, limit: i64) -> Result<Vec<IngestionJob>> {
        let rows = sqlx::query(
            "SELECT * FROM ingestion_job
             WHERE status = 'queued'
             ORDER BY created_at
             LIMIT $1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    /// Latest job for a source, by enqueue time.
    pub async fn latest_for_source(&self, source_id: Uuid) -> Result<Option<IngestionJob>> {
        let row = sqlx::query(
            "SELECT * FROM ingestion_job
             WHERE source_id = $1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    /// Whether any ingestion has ever succeeded for the tenant. Drives the
    /// knowledge-readiness check in answer composition.
    pub async fn has_succeeded_for_tenant(&self, tenant_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
                 SELECT 1 FROM ingestion_job
                 WHERE tenant_id = $1 AND status = 'succeeded'
             )",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(exists)
    }
}
