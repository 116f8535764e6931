//! Lead reminder repository implementation.
//!
//! Scheduling is idempotent: the unique constraint on
//! (tenant, lead, reason, scheduled_for) absorbs concurrent scan passes, and
//! the lead row is re-locked and re-validated before any insert so a lead
//! contacted mid-scan never gets a reminder.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use botforge_core::defaults::CLAIM_LEASE_SECS;
use botforge_core::{Error, EventSource, LeadReminder, ReminderStatus, Result};

use crate::leads::insert_event;

/// PostgreSQL repository for lead reminders.
#[derive(Clone)]
pub struct PgReminderRepository {
    pool: Pool<Postgres>,
}

impl PgReminderRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> LeadReminder {
        LeadReminder {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            lead_id: row.get("lead_id"),
            reason: row.get("reason"),
            status: ReminderStatus::from_str_lossy(row.get("status")),
            scheduled_for: row.get("scheduled_for"),
            sent_at: row.get("sent_at"),
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            last_channel: row.get("last_channel"),
            next_attempt_at: row.get("next_attempt_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Fetch a reminder by id.
    pub async fn get(&self, id: Uuid) -> Result<LeadReminder> {
        let row = sqlx::query("SELECT * FROM lead_reminder WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_row)
            .ok_or_else(|| Error::NotFound(format!("lead reminder {}", id)))
    }

    /// Schedule an overdue-followup reminder for a lead.
    ///
    /// Locks the lead row and re-checks that its deadline is still set and
    /// still overdue; the lead may have been contacted or deleted between
    /// the scan and this call, in which case nothing is scheduled. Returns
    /// the new reminder id, or `None` when the precondition no longer holds
    /// or an identical reminder already exists.
    pub async fn schedule_for_lead(
        &self,
        lead_id: Uuid,
        reason: &str,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let lead_row = sqlx::query(
            "SELECT tenant_id, next_action_at, deleted_at FROM lead WHERE id = $1 FOR UPDATE",
        )
        .bind(lead_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let lead_row = match lead_row {
            Some(row) => row,
            None => {
                tx.rollback().await.map_err(Error::Database)?;
                return Ok(None);
            }
        };

        let tenant_id: Uuid = lead_row.get("tenant_id");
        let next_action_at: Option<DateTime<Utc>> = lead_row.get("next_action_at");
        let deleted_at: Option<DateTime<Utc>> = lead_row.get("deleted_at");

        let still_due = deleted_at.is_none() && next_action_at.map_or(false, |at| at <= now);
        if !still_due {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(None);
        }

        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO lead_reminder
                 (id, tenant_id, lead_id, reason, status, scheduled_for,
                  attempts, last_error, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'scheduled', $5, 0, '', $6, $6)
             ON CONFLICT (tenant_id, lead_id, reason, scheduled_for) DO NOTHING
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(lead_id)
        .bind(reason)
        .bind(scheduled_for)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if let Some(reminder_id) = inserted {
            insert_event(
                &mut tx,
                tenant_id,
                lead_id,
                "lead.reminder.scheduled",
                EventSource::System,
                None,
                serde_json::json!({
                    "reminder_id": reminder_id,
                    "reason": reason,
                    "scheduled_for": scheduled_for,
                }),
            )
            .await?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(inserted)
    }

    /// Cancel a reminder that became obsolete before it was sent.
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE lead_reminder
             SET status = 'canceled', next_attempt_at = NULL, updated_at = $2
             WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Claim scheduled reminders whose send time and retry gate have both
    /// passed, oldest first.
    ///
    /// Claiming pushes `next_attempt_at` past `now` by [`CLAIM_LEASE_SECS`],
    /// so a concurrent scan no longer sees the row as due; the attempt's
    /// disposition overwrites the lease, and a worker that dies mid-attempt
    /// releases the row when the lease expires.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<LeadReminder>> {
        let lease_until = now + Duration::seconds(CLAIM_LEASE_SECS);
        let rows = sqlx::query(
            "UPDATE lead_reminder
             SET next_attempt_at = $2, updated_at = $1
             WHERE id IN (
                 SELECT id FROM lead_reminder
                 WHERE status = 'scheduled'
                   AND scheduled_for <= $1
                   AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
                 ORDER BY scheduled_for
                 LIMIT $3
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(now)
        .bind(lease_until)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    /// Record a successful send and append the ledger event in the same
    /// transaction.
    ///
    /// A no-op when the reminder already left `scheduled`: whichever worker
    /// finishes it first wins, and no second ledger event is written.
    pub async fn mark_sent(
        &self,
        reminder: &LeadReminder,
        attempts: i32,
        channel: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let updated = sqlx::query(
            "UPDATE lead_reminder
             SET status = 'sent', attempts = $2, last_channel = $3, last_error = '',
                 next_attempt_at = NULL, sent_at = $4, updated_at = $4
             WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(reminder.id)
        .bind(attempts)
        .bind(channel)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(());
        }

        insert_event(
            &mut tx,
            reminder.tenant_id,
            reminder.lead_id,
            "lead.reminder.sent",
            EventSource::System,
            None,
            serde_json::json!({
                "reminder_id": reminder.id,
                "reason": reminder.reason,
                "channel": channel,
            }),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    /// Record a failed send attempt.
    ///
    /// With `next_attempt_at` set the reminder stays scheduled and retries
    /// later; without it the failure is terminal and a ledger event is
    /// appended. Either way the write only applies while the reminder is
    /// still `scheduled`; a reminder another worker already finished is
    /// left untouched.
    pub async fn record_failure(
        &self,
        reminder: &LeadReminder,
        attempts: i32,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        match next_attempt_at {
            Some(at) => {
                sqlx::query(
                    "UPDATE lead_reminder
                     SET attempts = $2, last_error = $3, next_attempt_at = $4, updated_at = $5
                     WHERE id = $1 AND status = 'scheduled'",
                )
                .bind(reminder.id)
                .bind(attempts)
                .bind(error)
                .bind(at)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
            None => {
                let updated = sqlx::query(
                    "UPDATE lead_reminder
                     SET status = 'failed', attempts = $2, last_error = $3,
                         next_attempt_at = NULL, updated_at = $4
                     WHERE id = $1 AND status = 'scheduled'",
                )
                .bind(reminder.id)
                .bind(attempts)
                .bind(error)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;

                if updated.rows_affected() == 0 {
                    tx.rollback().await.map_err(Error::Database)?;
                    return Ok(());
                }

                insert_event(
                    &mut tx,
                    reminder.tenant_id,
                    reminder.lead_id,
                    "lead.reminder.failed",
                    EventSource::System,
                    None,
                    serde_json::json!({
                        "reminder_id": reminder.id,
                        "reason": reminder.reason,
                        "error": error,
                    }),
                )
                .await?;
            }
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
