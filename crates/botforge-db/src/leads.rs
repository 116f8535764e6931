//! Lead repository implementation.
//!
//! Every state change on a lead appends a row to the `lead_event` ledger in
//! the same transaction as the mutation, so the ledger can never disagree
//! with the lead row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use botforge_core::sla::{compute_next_action_at, default_sla_minutes, merge_sla_minutes};
use botforge_core::{Error, EventSource, Lead, LeadEvent, Result};

/// Request to create a lead.
#[derive(Debug, Clone)]
pub struct CreateLeadRequest {
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: String,
}

/// PostgreSQL repository for leads and their event ledger.
#[derive(Clone)]
pub struct PgLeadRepository {
    pool: Pool<Postgres>,
}

impl PgLeadRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Lead {
        Lead {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
            status: row.get("status"),
            assigned_to: row.get("assigned_to"),
            last_contacted_at: row.get("last_contacted_at"),
            next_action_at: row.get("next_action_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        }
    }

    fn parse_event_row(row: sqlx::postgres::PgRow) -> LeadEvent {
        LeadEvent {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            lead_id: row.get("lead_id"),
            event_type: row.get("event_type"),
            source: EventSource::from_str_lossy(row.get("source")),
            actor_user_id: row.get("actor_user_id"),
            data: row.get("data"),
            created_at: row.get("created_at"),
        }
    }

    /// Effective minutes-by-status schedule for a tenant, or `None` when the
    /// tenant disabled SLA reminders entirely.
    pub async fn sla_minutes_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<HashMap<String, i64>>> {
        let row = sqlx::query(
            "SELECT is_enabled, minutes_by_status FROM lead_sla_policy WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            None => Ok(Some(default_sla_minutes())),
            Some(row) => {
                let is_enabled: bool = row.get("is_enabled");
                if !is_enabled {
                    return Ok(None);
                }
                let overrides: JsonValue = row.get("minutes_by_status");
                Ok(Some(merge_sla_minutes(&overrides)))
            }
        }
    }

    /// Create a lead with its follow-up deadline precomputed from the
    /// tenant's SLA policy.
    pub async fn create(&self, req: CreateLeadRequest) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let next_action_at = match self.sla_minutes_for_tenant(req.tenant_id).await? {
            Some(minutes) => {
                compute_next_action_at(&req.status, None, Some(now), now, &minutes)
            }
            None => None,
        };

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO lead
                 (id, tenant_id, name, email, phone, status, last_contacted_at,
                  next_action_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $8, $8)",
        )
        .bind(id)
        .bind(req.tenant_id)
        .bind(&req.name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(&req.status)
        .bind(next_action_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        insert_event(
            &mut tx,
            req.tenant_id,
            id,
            "lead.created",
            EventSource::System,
            None,
            json!({"status": req.status}),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(id)
    }

    /// Fetch a lead by id, including soft-deleted rows.
    pub async fn get(&self, id: Uuid) -> Result<Lead> {
        let row = sqlx::query("SELECT * FROM lead WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_row)
            .ok_or_else(|| Error::NotFound(format!("lead {}", id)))
    }

    /// Record a contact on a lead.
    ///
    /// Sets `last_contacted_at`, recomputes the follow-up deadline anchored
    /// on the new contact time, and appends a `lead.contacted` event in the
    /// same transaction.
    pub async fn touch(
        &self,
        id: Uuid,
        source: EventSource,
        actor_user_id: Option<Uuid>,
    ) -> Result<()> {
        let now = Utc::now();
        let lead = self.get(id).await?;

        let next_action_at = match self.sla_minutes_for_tenant(lead.tenant_id).await? {
            Some(minutes) => {
                compute_next_action_at(&lead.status, Some(now), Some(lead.created_at), now, &minutes)
            }
            None => None,
        };

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "UPDATE lead
             SET last_contacted_at = $2, next_action_at = $3, updated_at = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .bind(next_action_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        // Contact supersedes any reminder still waiting to fire.
        sqlx::query(
            "UPDATE lead_reminder
             SET status = 'canceled', updated_at = $2
             WHERE lead_id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        insert_event(
            &mut tx,
            lead.tenant_id,
            id,
            "lead.contacted",
            source,
            actor_user_id,
            json!({}),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Change a lead's status and recompute its follow-up deadline under the
    /// new status.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: &str,
        source: EventSource,
        actor_user_id: Option<Uuid>,
    ) -> Result<()> {
        let now = Utc::now();
        let lead = self.get(id).await?;

        let next_action_at = match self.sla_minutes_for_tenant(lead.tenant_id).await? {
            Some(minutes) => compute_next_action_at(
                status,
                lead.last_contacted_at,
                Some(lead.created_at),
                now,
                &minutes,
            ),
            None => None,
        };

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "UPDATE lead SET status = $2, next_action_at = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(next_action_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        insert_event(
            &mut tx,
            lead.tenant_id,
            id,
            "lead.status_changed",
            source,
            actor_user_id,
            json!({"from": lead.status, "to": status}),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Leads whose follow-up deadline has passed, oldest deadline first.
    /// Soft-deleted leads are excluded.
    pub async fn due_leads(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Lead>> {
        let rows = sqlx::query(
            "SELECT * FROM lead
             WHERE deleted_at IS NULL
               AND next_action_at IS NOT NULL
               AND next_action_at <= $1
             ORDER BY next_action_at
             LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    /// Event ledger for a lead, oldest first.
    pub async fn events(&self, lead_id: Uuid) -> Result<Vec<LeadEvent>> {
        let rows = sqlx::query("SELECT * FROM lead_event WHERE lead_id = $1 ORDER BY created_at")
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_event_row).collect())
    }
}

/// Append a row to the lead event ledger inside an open transaction.
pub(crate) async fn insert_event(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    tenant_id: Uuid,
    lead_id: Uuid,
    event_type: &str,
    source: EventSource,
    actor_user_id: Option<Uuid>,
    data: JsonValue,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO lead_event
             (id, tenant_id, lead_id, event_type, source, actor_user_id, data, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(lead_id)
    .bind(event_type)
    .bind(source.as_str())
    .bind(actor_user_id)
    .bind(&data)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;
    Ok(())
}
