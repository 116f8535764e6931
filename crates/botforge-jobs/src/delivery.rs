//! Outbound delivery of webhooks and lead reminders.
//!
//! Both kinds of work share the retry engine in botforge-core: each attempt
//! increments the counter, performs the external call, classifies the
//! result, and applies the resulting disposition to the row.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use botforge_core::defaults::WEBHOOK_TIMEOUT_SECS;
use botforge_core::{
    dispose, sign_payload, AttemptOutcome, Disposition, Error, Lead, LeadReminder, Result,
    WebhookDelivery,
};
use botforge_db::Database;

/// Signature header attached to every webhook POST.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Event type header attached to every webhook POST.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Event type emitted when a lead reminder fires.
pub const LEAD_REMINDER_DUE_EVENT: &str = "lead.reminder.due";

/// Classify an HTTP response status for retry purposes. Rate limiting and
/// server errors are transient; any other client error is permanent.
pub fn classify_http_status(status: u16) -> AttemptOutcome {
    match status {
        200..=299 => AttemptOutcome::Success,
        429 => AttemptOutcome::Retryable(format!("HTTP {}", status)),
        500..=599 => AttemptOutcome::Retryable(format!("HTTP {}", status)),
        _ => AttemptOutcome::Permanent(format!("HTTP {}", status)),
    }
}

/// Delivers webhook events to tenant-registered endpoints.
#[derive(Clone)]
pub struct WebhookDeliverer {
    db: Database,
    http: reqwest::Client,
}

impl WebhookDeliverer {
    pub fn new(db: Database) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("failed to build webhook client: {}", e)))?;
        Ok(Self { db, http })
    }

    /// Fan an event out to every active endpoint of the tenant subscribed
    /// to it. Returns the created delivery ids; the scheduler picks them up
    /// for their first attempt.
    pub async fn emit(
        &self,
        tenant_id: Uuid,
        event_type: &str,
        data: &JsonValue,
    ) -> Result<Vec<Uuid>> {
        let endpoints = self
            .db
            .webhooks
            .list_active_for_event(tenant_id, event_type)
            .await?;

        let mut delivery_ids = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let id = self
                .db
                .webhooks
                .create_delivery(tenant_id, endpoint.id, event_type, data)
                .await?;
            delivery_ids.push(id);
        }

        debug!(
            subsystem = "jobs",
            component = "webhook_delivery",
            op = "emit",
            tenant_id = %tenant_id,
            event_type = event_type,
            result_count = delivery_ids.len(),
            "Fanned out event to endpoints"
        );
        Ok(delivery_ids)
    }

    /// Perform one delivery attempt and persist the disposition.
    pub async fn attempt(&self, delivery: &WebhookDelivery) -> Result<Disposition> {
        let attempts = delivery.attempts + 1;
        let endpoint = self.db.webhooks.get_endpoint(delivery.endpoint_id).await?;

        // A delivery whose endpoint was deactivated, or that points at
        // another tenant's endpoint, must never be signed and sent.
        if !endpoint.is_active || endpoint.tenant_id != delivery.tenant_id {
            let disposition = Disposition::Failed {
                error: "endpoint inactive or tenant mismatch".to_string(),
            };
            self.apply(delivery, attempts, &disposition, None).await?;
            return Ok(disposition);
        }

        let body = json!({
            "type": delivery.event_type,
            "tenant_id": delivery.tenant_id,
            "data": delivery.payload,
            "delivery_id": delivery.id,
            "created_at": delivery.created_at,
        });
        let signature = sign_payload(&endpoint.secret, &body)?;

        let response = self
            .http
            .post(&endpoint.url)
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, &delivery.event_type)
            .json(&body)
            .send()
            .await;

        let (outcome, http_status) = match response {
            Ok(response) => {
                let status = response.status().as_u16();
                (classify_http_status(status), Some(status as i32))
            }
            Err(e) => (AttemptOutcome::Retryable(format!("transport: {}", e)), None),
        };

        let disposition = dispose(outcome, attempts, Utc::now());
        self.apply(delivery, attempts, &disposition, http_status)
            .await?;
        Ok(disposition)
    }

    async fn apply(
        &self,
        delivery: &WebhookDelivery,
        attempts: i32,
        disposition: &Disposition,
        http_status: Option<i32>,
    ) -> Result<()> {
        match disposition {
            Disposition::Delivered => {
                info!(
                    subsystem = "jobs",
                    component = "webhook_delivery",
                    delivery_id = %delivery.id,
                    attempts = attempts,
                    "Webhook delivered"
                );
                self.db
                    .webhooks
                    .mark_sent(delivery.id, attempts, http_status.unwrap_or(200))
                    .await
            }
            Disposition::RetryAt { at, error } => {
                warn!(
                    subsystem = "jobs",
                    component = "webhook_delivery",
                    delivery_id = %delivery.id,
                    attempts = attempts,
                    error = %error,
                    "Webhook attempt failed, retry scheduled"
                );
                self.db
                    .webhooks
                    .schedule_retry(delivery.id, attempts, *at, error, http_status)
                    .await
            }
            Disposition::Failed { error } => {
                warn!(
                    subsystem = "jobs",
                    component = "webhook_delivery",
                    delivery_id = %delivery.id,
                    attempts = attempts,
                    error = %error,
                    "Webhook delivery failed terminally"
                );
                self.db
                    .webhooks
                    .mark_failed(delivery.id, attempts, error, http_status)
                    .await
            }
        }
    }
}

/// Transport seam for reminder notifications.
///
/// The default deployment fans reminders out over webhooks; installations
/// with an SMTP relay plug their own sender in here.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_reminder(&self, reminder: &LeadReminder, lead: &Lead) -> Result<()>;
}

/// Sender used when no email transport is configured. Always succeeds so
/// the webhook fan-out remains the delivery channel of record.
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send_reminder(&self, reminder: &LeadReminder, lead: &Lead) -> Result<()> {
        debug!(
            subsystem = "jobs",
            component = "reminder_delivery",
            reminder_id = %reminder.id,
            lead_id = %lead.id,
            "No email transport configured, skipping email"
        );
        Ok(())
    }
}

/// Delivers due lead reminders.
pub struct ReminderDeliverer {
    db: Database,
    webhooks: WebhookDeliverer,
    email: Box<dyn EmailSender>,
}

impl ReminderDeliverer {
    pub fn new(db: Database, webhooks: WebhookDeliverer, email: Box<dyn EmailSender>) -> Self {
        Self {
            db,
            webhooks,
            email,
        }
    }

    /// Perform one reminder delivery attempt and persist the disposition.
    ///
    /// A reminder whose lead was contacted or deleted since scheduling is
    /// canceled silently rather than sent.
    pub async fn attempt(&self, reminder: &LeadReminder) -> Result<Disposition> {
        let attempts = reminder.attempts + 1;
        let lead = self.db.leads.get(reminder.lead_id).await?;

        if lead.deleted_at.is_some() || lead.next_action_at.is_none() {
            info!(
                subsystem = "jobs",
                component = "reminder_delivery",
                reminder_id = %reminder.id,
                lead_id = %lead.id,
                "Lead no longer overdue, reminder obsolete"
            );
            self.db.reminders.cancel(reminder.id).await?;
            return Ok(Disposition::Failed {
                error: "lead no longer overdue".to_string(),
            });
        }

        let outcome = match self.email.send_reminder(reminder, &lead).await {
            Ok(()) => AttemptOutcome::Success,
            Err(e) => AttemptOutcome::Retryable(e.to_string()),
        };

        let disposition = dispose(outcome, attempts, Utc::now());
        match &disposition {
            Disposition::Delivered => {
                self.db
                    .reminders
                    .mark_sent(reminder, attempts, "email")
                    .await?;
                info!(
                    subsystem = "jobs",
                    component = "reminder_delivery",
                    reminder_id = %reminder.id,
                    lead_id = %lead.id,
                    attempts = attempts,
                    "Reminder sent"
                );

                // Fan-out failures are logged, never fatal: the reminder
                // itself has already been delivered.
                let data = json!({
                    "lead_id": lead.id,
                    "reminder_id": reminder.id,
                    "reason": reminder.reason,
                    "lead_name": lead.name,
                    "lead_status": lead.status,
                    "scheduled_for": reminder.scheduled_for,
                });
                if let Err(e) = self
                    .webhooks
                    .emit(reminder.tenant_id, LEAD_REMINDER_DUE_EVENT, &data)
                    .await
                {
                    warn!(
                        subsystem = "jobs",
                        component = "reminder_delivery",
                        reminder_id = %reminder.id,
                        error = %e,
                        "Failed to fan out reminder event"
                    );
                }
            }
            Disposition::RetryAt { at, error } => {
                warn!(
                    subsystem = "jobs",
                    component = "reminder_delivery",
                    reminder_id = %reminder.id,
                    attempts = attempts,
                    error = %error,
                    "Reminder attempt failed, retry scheduled"
                );
                self.db
                    .reminders
                    .record_failure(reminder, attempts, error, Some(*at))
                    .await?;
            }
            Disposition::Failed { error } => {
                warn!(
                    subsystem = "jobs",
                    component = "reminder_delivery",
                    reminder_id = %reminder.id,
                    attempts = attempts,
                    error = %error,
                    "Reminder delivery failed terminally"
                );
                self.db
                    .reminders
                    .record_failure(reminder, attempts, error, None)
                    .await?;
            }
        }
        Ok(disposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses() {
        assert_eq!(classify_http_status(200), AttemptOutcome::Success);
        assert_eq!(classify_http_status(204), AttemptOutcome::Success);
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(matches!(
            classify_http_status(429),
            AttemptOutcome::Retryable(_)
        ));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            assert!(matches!(
                classify_http_status(status),
                AttemptOutcome::Retryable(_)
            ));
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 410, 422] {
            assert!(matches!(
                classify_http_status(status),
                AttemptOutcome::Permanent(_)
            ));
        }
    }

    #[test]
    fn test_redirects_are_permanent() {
        // A webhook receiver should answer directly, not redirect.
        assert!(matches!(
            classify_http_status(301),
            AttemptOutcome::Permanent(_)
        ));
    }
}
