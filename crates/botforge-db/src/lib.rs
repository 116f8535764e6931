//! # botforge-db
//!
//! PostgreSQL persistence layer for botforge.
//!
//! This crate provides:
//! - Connection pool management
//! - Repositories for knowledge sources, ingestion jobs, webhook endpoints
//!   and deliveries, leads, and lead reminders
//! - Row-lock based claim semantics (`FOR UPDATE SKIP LOCKED`) so multiple
//!   workers can share one queue without double-processing
//!
//! ## Example
//!
//! ```rust,ignore
//! use botforge_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/botforge").await?;
//!     let (job, created) = db
//!         .ingestion
//!         .create_or_get(tenant_id, source_id, "req-123")
//!         .await?;
//!     println!("job: {} (created: {})", job.id, created);
//!     Ok(())
//! }
//! ```

pub mod ingestion;
pub mod leads;
pub mod pool;
pub mod reminders;
pub mod sources;
pub mod webhooks;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use botforge_core::*;

// Re-export repository implementations
pub use ingestion::{PgIngestionJobRepository, RunDecision};
pub use leads::{CreateLeadRequest, PgLeadRepository};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use reminders::PgReminderRepository;
pub use sources::{CreateSourceRequest, PgSourceRepository};
pub use webhooks::PgWebhookRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Knowledge source repository.
    pub sources: PgSourceRepository,
    /// Ingestion job repository.
    pub ingestion: PgIngestionJobRepository,
    /// Webhook endpoint and delivery repository.
    pub webhooks: PgWebhookRepository,
    /// Lead repository with the event ledger.
    pub leads: PgLeadRepository,
    /// Lead reminder repository.
    pub reminders: PgReminderRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            sources: PgSourceRepository::new(pool.clone()),
            ingestion: PgIngestionJobRepository::new(pool.clone()),
            webhooks: PgWebhookRepository::new(pool.clone()),
            leads: PgLeadRepository::new(pool.clone()),
            reminders: PgReminderRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect to test database (for integration tests).
    pub async fn connect_test() -> Result<Self> {
        Self::connect(&test_fixtures::test_database_url()).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}
