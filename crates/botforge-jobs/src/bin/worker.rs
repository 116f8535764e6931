//! Worker binary: runs the ingestion worker and the due-work scheduler.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use botforge_db::{Database, PoolConfig};
use botforge_jobs::{
    Extractor, IngestionRunner, JobWorker, NoopEmailSender, ReminderDeliverer, Scheduler,
    SchedulerConfig, WebhookDeliverer, WorkerConfig,
};
use botforge_search::{IndexClient, IndexConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;

    let index = IndexClient::new(IndexConfig::from_env())?;
    index.ensure_index().await?;

    let runner = IngestionRunner::new(db.clone(), index.clone(), Extractor::new()?);
    let worker = JobWorker::new(db.clone(), runner, WorkerConfig::from_env());
    let worker_handle = worker.start();

    let webhooks = WebhookDeliverer::new(db.clone())?;
    let reminders = Arc::new(ReminderDeliverer::new(
        db.clone(),
        webhooks.clone(),
        Box::new(NoopEmailSender),
    ));
    let scheduler = Scheduler::new(db, webhooks, reminders, SchedulerConfig::from_env());
    let scheduler_handle = scheduler.start();

    info!("botforge worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    worker_handle.shutdown().await?;
    scheduler_handle.shutdown().await?;
    Ok(())
}
