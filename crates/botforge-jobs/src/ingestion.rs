//! Knowledge-source ingestion pipeline.
//!
//! Runs one job through the stage ladder: cleanup (drop stale index docs),
//! extract, chunk, index. Stage transitions are committed as they happen so
//! the job row reflects live progress, and any failure is captured on the
//! job instead of escaping to the worker loop.

use std::time::Instant;

use tracing::{error, info, warn};

use botforge_core::defaults::{
    CHUNK_MAX_CHARS, CHUNK_OVERLAP, ERROR_CODE_INGESTION_FAILED, ERROR_CODE_SOURCE_INACTIVE,
};
use botforge_core::{chunk_text, Error, IngestStage, IngestionJob, Result};
use botforge_db::{Database, RunDecision};
use botforge_search::IndexClient;

use crate::extract::Extractor;

/// Outcome of running one ingestion job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The pipeline completed; `chunk_count` documents were indexed.
    Succeeded { chunk_count: usize },
    /// The job had already succeeded; nothing was done.
    AlreadySucceeded,
    /// Another worker owns the job, or it is terminally failed.
    Skipped,
    /// The pipeline failed; the job row carries the error code and message.
    Failed { error_code: String },
}

/// Executes ingestion jobs end to end.
#[derive(Clone)]
pub struct IngestionRunner {
    db: Database,
    index: IndexClient,
    extractor: Extractor,
}

impl IngestionRunner {
    pub fn new(db: Database, index: IndexClient, extractor: Extractor) -> Self {
        Self {
            db,
            index,
            extractor,
        }
    }

    /// Run one claimed job through the full pipeline.
    ///
    /// Infrastructure errors while recording the result still propagate;
    /// everything that happens inside the pipeline is captured on the job
    /// row as a terminal failure.
    pub async fn run(&self, job: &IngestionJob) -> Result<RunOutcome> {
        let start = Instant::now();

        // Inactive or vanished sources fail before the job ever transitions
        // to running: the job stays out of the running state entirely, with
        // a dedicated code the dashboard can distinguish from pipeline
        // errors.
        let source = match self.db.sources.get(job.source_id).await {
            Ok(source) if source.is_active => source,
            Ok(_) | Err(Error::SourceNotFound(_)) => {
                self.db
                    .ingestion
                    .mark_failed(job.id, ERROR_CODE_SOURCE_INACTIVE, "source is not active")
                    .await?;
                return Ok(RunOutcome::Failed {
                    error_code: ERROR_CODE_SOURCE_INACTIVE.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        match self.db.ingestion.begin_run(job.id).await? {
            RunDecision::Started => {}
            RunDecision::AlreadySucceeded => {
                info!(
                    subsystem = "jobs",
                    component = "ingestion",
                    job_id = %job.id,
                    "Job already succeeded, skipping"
                );
                return Ok(RunOutcome::AlreadySucceeded);
            }
            RunDecision::Conflict => {
                warn!(
                    subsystem = "jobs",
                    component = "ingestion",
                    job_id = %job.id,
                    "Job not runnable, skipping"
                );
                return Ok(RunOutcome::Skipped);
            }
        }

        match self.run_pipeline(job, &source).await {
            Ok(chunk_count) => {
                self.db.ingestion.mark_succeeded(job.id).await?;
                info!(
                    subsystem = "jobs",
                    component = "ingestion",
                    job_id = %job.id,
                    source_id = %job.source_id,
                    tenant_id = %job.tenant_id,
                    chunk_count = chunk_count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Ingestion succeeded"
                );
                Ok(RunOutcome::Succeeded { chunk_count })
            }
            Err(e) => {
                let message = e.to_string();
                error!(
                    subsystem = "jobs",
                    component = "ingestion",
                    job_id = %job.id,
                    source_id = %job.source_id,
                    error = %message,
                    "Ingestion failed"
                );
                self.db
                    .ingestion
                    .mark_failed(job.id, ERROR_CODE_INGESTION_FAILED, &message)
                    .await?;
                Ok(RunOutcome::Failed {
                    error_code: ERROR_CODE_INGESTION_FAILED.to_string(),
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        job: &IngestionJob,
        source: &botforge_core::KnowledgeSource,
    ) -> Result<usize> {
        // cleanup: the job entered this stage in begin_run
        self.index
            .delete_by_source(job.tenant_id, job.source_id)
            .await?;

        self.db.ingestion.set_stage(job.id, IngestStage::Extract).await?;
        let text = self.extractor.extract(source).await?;
        if text.is_empty() {
            return Err(Error::Extraction("no text content extracted".to_string()));
        }

        self.db.ingestion.set_stage(job.id, IngestStage::Chunk).await?;
        let chunks = chunk_text(&text, CHUNK_MAX_CHARS, CHUNK_OVERLAP);
        if chunks.is_empty() {
            return Err(Error::Extraction("chunking produced no chunks".to_string()));
        }

        self.db.ingestion.set_stage(job.id, IngestStage::Index).await?;
        let indexed = self
            .index
            .upsert_chunks(job.tenant_id, job.source_id, &source.title, &chunks)
            .await?;

        Ok(indexed)
    }
}
