//! Webhook endpoint and delivery repository implementation.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use botforge_core::defaults::CLAIM_LEASE_SECS;
use botforge_core::{
    CreateWebhookEndpointRequest, DeliveryStatus, Error, Result, WebhookDelivery, WebhookEndpoint,
};

/// PostgreSQL repository for webhook endpoints and deliveries.
#[derive(Clone)]
pub struct PgWebhookRepository {
    pool: Pool<Postgres>,
}

impl PgWebhookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_endpoint_row(row: sqlx::postgres::PgRow) -> WebhookEndpoint {
        WebhookEndpoint {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            url: row.get("url"),
            secret: row.get("secret"),
            is_active: row.get("is_active"),
            events: row.get("events"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn parse_delivery_row(row: sqlx::postgres::PgRow) -> WebhookDelivery {
        WebhookDelivery {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            endpoint_id: row.get("endpoint_id"),
            event_type: row.get("event_type"),
            payload: row.get("payload"),
            status: DeliveryStatus::from_str_lossy(row.get("status")),
            attempts: row.get("attempts"),
            next_attempt_at: row.get("next_attempt_at"),
            last_http_status: row.get("last_http_status"),
            last_error: row.get("last_error"),
            delivered_at: row.get("delivered_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Register a webhook endpoint with a freshly generated signing secret.
    ///
    /// The returned struct is the only place the secret is handed back in
    /// full; subsequent reads serve signing internally.
    pub async fn create_endpoint(
        &self,
        req: CreateWebhookEndpointRequest,
    ) -> Result<WebhookEndpoint> {
        let id = Uuid::new_v4();
        let secret = Self::generate_secret();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO webhook_endpoint
                 (id, tenant_id, url, secret, is_active, events, created_at, updated_at)
             VALUES ($1, $2, $3, $4, TRUE, $5, $6, $6)",
        )
        .bind(id)
        .bind(req.tenant_id)
        .bind(&req.url)
        .bind(&secret)
        .bind(&req.events)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(WebhookEndpoint {
            id,
            tenant_id: req.tenant_id,
            url: req.url,
            secret,
            is_active: true,
            events: req.events,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch an endpoint by id.
    pub async fn get_endpoint(&self, id: Uuid) -> Result<WebhookEndpoint> {
        let row = sqlx::query("SELECT * FROM webhook_endpoint WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_endpoint_row)
            .ok_or_else(|| Error::NotFound(format!("webhook endpoint {}", id)))
    }

    /// Active endpoints of a tenant subscribed to the given event type.
    /// An empty subscription list means the endpoint wants all events.
    pub async fn list_active_for_event(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<WebhookEndpoint>> {
        let rows = sqlx::query(
            "SELECT * FROM webhook_endpoint
             WHERE tenant_id = $1 AND is_active
               AND (events = '{}' OR $2 = ANY(events))
             ORDER BY created_at",
        )
        .bind(tenant_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_endpoint_row).collect())
    }

    /// Deactivate an endpoint. Pending deliveries to it keep retrying until
    /// the deliverer observes the flag.
    pub async fn set_endpoint_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE webhook_endpoint SET is_active = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("webhook endpoint {}", id)));
        }
        Ok(())
    }

    /// Record one event occurrence fanned out to one endpoint.
    pub async fn create_delivery(
        &self,
        tenant_id: Uuid,
        endpoint_id: Uuid,
        event_type: &str,
        payload: &JsonValue,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO webhook_delivery
                 (id, tenant_id, endpoint_id, event_type, payload, status,
                  attempts, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $6)",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(endpoint_id)
        .bind(event_type)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    /// Fetch a delivery by id.
    pub async fn get_delivery(&self, id: Uuid) -> Result<WebhookDelivery> {
        let row = sqlx::query("SELECT * FROM webhook_delivery WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_delivery_row)
            .ok_or_else(|| Error::NotFound(format!("webhook delivery {}", id)))
    }

    /// Claim pending deliveries whose next attempt is due, oldest first.
    ///
    /// A NULL `next_attempt_at` means "as soon as possible" (a fresh
    /// delivery that has never been attempted). Claiming pushes
    /// `next_attempt_at` past `now` by [`CLAIM_LEASE_SECS`], so a
    /// concurrent scan no longer sees the row as due; the attempt's own
    /// disposition overwrites the lease, and a worker that dies mid-attempt
    /// releases the row when the lease expires.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WebhookDelivery>> {
        let lease_until = now + Duration::seconds(CLAIM_LEASE_SECS);
        let rows = sqlx::query(
            "UPDATE webhook_delivery
             SET next_attempt_at = $2, updated_at = $1
             WHERE id IN (
                 SELECT id FROM webhook_delivery
                 WHERE status = 'pending'
                   AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
                 ORDER BY created_at
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

        Ok(rows.into_iter().map(Self::parse_delivery_row).collect())
    }

    /// Record a successful delivery attempt.
    ///
    /// A no-op when the delivery already left `pending`; terminal
    /// transitions never overwrite each other.
    pub async fn mark_sent(&self, id: Uuid, attempts: i32, http_status: i32) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE webhook_delivery
             SET status = 'sent', attempts = $2, last_http_status = $3,
                 last_error = NULL, next_attempt_at = NULL,
                 delivered_at = $4, updated_at = $4
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(attempts)
        .bind(http_status)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Record a retryable failure and park the delivery until `next_attempt_at`.
    pub async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        http_status: Option<i32>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_delivery
             SET attempts = $2, next_attempt_at = $3, last_error = $4,
                 last_http_status = $5, updated_at = $6
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(error)
        .bind(http_status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Record a terminal failure. A no-op when the delivery already left
    /// `pending`.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
        http_status: Option<i32>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_delivery
             SET status = 'failed', attempts = $2, last_error = $3,
                 last_http_status = $4, next_attempt_at = NULL, updated_at = $5
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .bind(http_status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
