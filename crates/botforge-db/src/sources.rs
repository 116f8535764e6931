//! Knowledge source repository implementation.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use botforge_core::{Error, KnowledgeSource, Result, SourceType};

/// Request to create a knowledge source.
#[derive(Debug, Clone)]
pub struct CreateSourceRequest {
    pub tenant_id: Uuid,
    pub source_type: SourceType,
    pub title: String,
    pub input_text: String,
    pub input_url: String,
    pub input_file: Option<Vec<u8>>,
    pub input_filename: Option<String>,
}

/// PostgreSQL repository for knowledge sources.
#[derive(Clone)]
pub struct PgSourceRepository {
    pool: Pool<Postgres>,
}

impl PgSourceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> KnowledgeSource {
        KnowledgeSource {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            source_type: SourceType::from_str_lossy(row.get("source_type")),
            title: row.get("title"),
            input_text: row.get("input_text"),
            input_url: row.get("input_url"),
            input_file: row.get("input_file"),
            input_filename: row.get("input_filename"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Create a new knowledge source.
    pub async fn create(&self, req: CreateSourceRequest) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO knowledge_source
                 (id, tenant_id, source_type, title, input_text, input_url,
                  input_file, input_filename, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $9)",
        )
        .bind(id)
        .bind(req.tenant_id)
        .bind(req.source_type.as_str())
        .bind(&req.title)
        .bind(&req.input_text)
        .bind(&req.input_url)
        .bind(&req.input_file)
        .bind(&req.input_filename)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    /// Fetch a source by id, failing with `SourceNotFound` when absent.
    pub async fn get(&self, id: Uuid) -> Result<KnowledgeSource> {
        let row = sqlx::query("SELECT * FROM knowledge_source WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_row).ok_or(Error::SourceNotFound(id))
    }

    /// List all sources for a tenant, newest first.
    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<KnowledgeSource>> {
        let rows = sqlx::query(
            "SELECT * FROM knowledge_source WHERE tenant_id = $1 ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    /// Activate or deactivate a source. Deactivated sources are skipped by
    /// the ingestion pipeline.
    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE knowledge_source SET is_active = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::SourceNotFound(id));
        }
        Ok(())
    }
}
