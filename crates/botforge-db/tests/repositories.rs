//! Integration tests for the repository layer.
//!
//! These tests need a migrated PostgreSQL database; point `DATABASE_URL` at
//! one and run with `cargo test -- --ignored`.

use botforge_db::{
    CreateLeadRequest, CreateSourceRequest, CreateWebhookEndpointRequest, Database, EventSource,
    IngestStage, JobStatus, ReminderStatus, RunDecision, SourceType,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

async fn db() -> Database {
    Database::connect_test().await.expect("test database")
}

// Claim scans lease every due row in the table, so tests that claim must
// not overlap or they steal each other's rows.
static CLAIM_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

async fn seed_source(db: &Database, tenant_id: Uuid) -> Uuid {
    db.sources
        .create(CreateSourceRequest {
            tenant_id,
            source_type: SourceType::Text,
            title: "FAQ".to_string(),
            input_text: "Our support hours are 9 to 5.".to_string(),
            input_url: String::new(),
            input_file: None,
            input_filename: None,
        })
        .await
        .expect("create source")
}

#[tokio::test]
#[ignore]
async fn idempotency_key_deduplicates_jobs() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let source_id = seed_source(&db, tenant_id).await;

    let (first, created) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "req-1")
        .await
        .unwrap();
    assert!(created);
    assert_eq!(first.status, JobStatus::Queued);
    assert_eq!(first.idempotency_key, "req-1");

    // The repeat attaches to the existing job instead of enqueueing again.
    let (second, created) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "req-1")
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);

    let (third, created) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "req-2")
        .await
        .unwrap();
    assert!(created);
    assert_ne!(first.id, third.id);
}

#[tokio::test]
#[ignore]
async fn empty_idempotency_key_always_creates() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let source_id = seed_source(&db, tenant_id).await;

    let (first, created_first) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "")
        .await
        .unwrap();
    let (second, created_second) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "")
        .await
        .unwrap();
    assert!(created_first);
    assert!(created_second);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
#[ignore]
async fn begin_run_transitions_and_blocks_rerun() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let source_id = seed_source(&db, tenant_id).await;
    let (job, _) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "run-test")
        .await
        .unwrap();
    let job_id = job.id;

    assert_eq!(
        db.ingestion.begin_run(job_id).await.unwrap(),
        RunDecision::Started
    );
    let job = db.ingestion.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.stage, IngestStage::Cleanup);
    assert_eq!(job.progress_percent, 5);
    assert_eq!(job.attempts, 1);

    // A second worker arriving now must not start it again.
    assert_eq!(
        db.ingestion.begin_run(job_id).await.unwrap(),
        RunDecision::Conflict
    );

    db.ingestion.mark_succeeded(job_id).await.unwrap();
    assert_eq!(
        db.ingestion.begin_run(job_id).await.unwrap(),
        RunDecision::AlreadySucceeded
    );

    let job = db.ingestion.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress_percent, 100);
    assert!(db
        .ingestion
        .has_succeeded_for_tenant(tenant_id)
        .await
        .unwrap());
}

#[tokio::test]
#[ignore]
async fn mark_failed_truncates_long_messages() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let source_id = seed_source(&db, tenant_id).await;
    let (job, _) = db
        .ingestion
        .create_or_get(tenant_id, source_id, "fail-test")
        .await
        .unwrap();
    let job_id = job.id;

    let long_message = "x".repeat(5000);
    db.ingestion
        .mark_failed(job_id, "INGESTION_FAILED", &long_message)
        .await
        .unwrap();

    let job = db.ingestion.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, "INGESTION_FAILED");
    assert_eq!(job.error_message.chars().count(), 2000);
}

#[tokio::test]
#[ignore]
async fn endpoint_event_filtering() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();

    let all_events = db
        .webhooks
        .create_endpoint(CreateWebhookEndpointRequest {
            tenant_id,
            url: "https://example.com/all".to_string(),
            events: vec![],
        })
        .await
        .unwrap();
    let only_reminders = db
        .webhooks
        .create_endpoint(CreateWebhookEndpointRequest {
            tenant_id,
            url: "https://example.com/reminders".to_string(),
            events: vec!["lead.reminder.due".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(all_events.secret.len(), 64);

    let for_reminder = db
        .webhooks
        .list_active_for_event(tenant_id, "lead.reminder.due")
        .await
        .unwrap();
    assert_eq!(for_reminder.len(), 2);

    let for_other = db
        .webhooks
        .list_active_for_event(tenant_id, "source.ingested")
        .await
        .unwrap();
    assert_eq!(for_other.len(), 1);
    assert_eq!(for_other[0].id, all_events.id);

    db.webhooks
        .set_endpoint_active(only_reminders.id, false)
        .await
        .unwrap();
    let after_deactivate = db
        .webhooks
        .list_active_for_event(tenant_id, "lead.reminder.due")
        .await
        .unwrap();
    assert_eq!(after_deactivate.len(), 1);
}

#[tokio::test]
#[ignore]
async fn delivery_retry_fields_round_trip() {
    let _guard = CLAIM_LOCK.lock().await;
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let endpoint = db
        .webhooks
        .create_endpoint(CreateWebhookEndpointRequest {
            tenant_id,
            url: "https://example.com/hook".to_string(),
            events: vec![],
        })
        .await
        .unwrap();

    let payload = serde_json::json!({"lead_id": Uuid::new_v4()});
    let delivery_id = db
        .webhooks
        .create_delivery(tenant_id, endpoint.id, "lead.reminder.due", &payload)
        .await
        .unwrap();

    // Fresh deliveries are due immediately.
    let due = db.webhooks.claim_due(Utc::now(), 10).await.unwrap();
    assert!(due.iter().any(|d| d.id == delivery_id));

    let retry_at = Utc::now() + Duration::minutes(5);
    db.webhooks
        .schedule_retry(delivery_id, 1, retry_at, "HTTP 503", Some(503))
        .await
        .unwrap();
    let due_now = db.webhooks.claim_due(Utc::now(), 10).await.unwrap();
    assert!(!due_now.iter().any(|d| d.id == delivery_id));
    let due_later = db
        .webhooks
        .claim_due(Utc::now() + Duration::minutes(6), 10)
        .await
        .unwrap();
    assert!(due_later.iter().any(|d| d.id == delivery_id));

    db.webhooks.mark_sent(delivery_id, 2, 200).await.unwrap();
    let delivery = db.webhooks.get_delivery(delivery_id).await.unwrap();
    assert_eq!(delivery.attempts, 2);
    assert!(delivery.delivered_at.is_some());
}

#[tokio::test]
#[ignore]
async fn claimed_delivery_is_leased_against_second_scan() {
    let _guard = CLAIM_LOCK.lock().await;
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let endpoint = db
        .webhooks
        .create_endpoint(CreateWebhookEndpointRequest {
            tenant_id,
            url: "https://example.com/hook".to_string(),
            events: vec![],
        })
        .await
        .unwrap();
    let delivery_id = db
        .webhooks
        .create_delivery(tenant_id, endpoint.id, "lead.reminder.due", &serde_json::json!({}))
        .await
        .unwrap();

    let now = Utc::now();
    let first_scan = db.webhooks.claim_due(now, 10).await.unwrap();
    assert!(first_scan.iter().any(|d| d.id == delivery_id));

    // A second scanner ticking at the same moment must not see the row.
    let second_scan = db.webhooks.claim_due(now, 10).await.unwrap();
    assert!(!second_scan.iter().any(|d| d.id == delivery_id));

    // Once the lease runs out the row becomes due again.
    let after_lease = db
        .webhooks
        .claim_due(
            now + Duration::seconds(botforge_db::defaults::CLAIM_LEASE_SECS + 1),
            10,
        )
        .await
        .unwrap();
    assert!(after_lease.iter().any(|d| d.id == delivery_id));
}

#[tokio::test]
#[ignore]
async fn sent_delivery_ignores_late_dispositions() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let endpoint = db
        .webhooks
        .create_endpoint(CreateWebhookEndpointRequest {
            tenant_id,
            url: "https://example.com/hook".to_string(),
            events: vec![],
        })
        .await
        .unwrap();
    let delivery_id = db
        .webhooks
        .create_delivery(tenant_id, endpoint.id, "lead.reminder.due", &serde_json::json!({}))
        .await
        .unwrap();

    db.webhooks.mark_sent(delivery_id, 1, 200).await.unwrap();

    // A slower worker finishing the same attempt later must not regress
    // the terminal state.
    db.webhooks
        .mark_failed(delivery_id, 2, "HTTP 500", Some(500))
        .await
        .unwrap();
    db.webhooks
        .schedule_retry(delivery_id, 2, Utc::now() + Duration::minutes(5), "HTTP 503", Some(503))
        .await
        .unwrap();

    let delivery = db.webhooks.get_delivery(delivery_id).await.unwrap();
    assert_eq!(delivery.status, botforge_db::DeliveryStatus::Sent);
    assert_eq!(delivery.attempts, 1);
    assert!(delivery.next_attempt_at.is_none());
}

#[tokio::test]
#[ignore]
async fn reminder_scheduling_is_deduplicated() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let lead_id = db
        .leads
        .create(CreateLeadRequest {
            tenant_id,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: String::new(),
            status: "new".to_string(),
        })
        .await
        .unwrap();

    // Force the lead overdue.
    sqlx::query("UPDATE lead SET next_action_at = $2 WHERE id = $1")
        .bind(lead_id)
        .bind(Utc::now() - Duration::minutes(10))
        .execute(&db.pool)
        .await
        .unwrap();

    let lead = db.leads.get(lead_id).await.unwrap();
    let deadline = botforge_db::truncate_to_minute(lead.next_action_at.unwrap());

    let first = db
        .reminders
        .schedule_for_lead(lead_id, "sla_overdue", deadline, Utc::now())
        .await
        .unwrap();
    assert!(first.is_some());

    // A second scan pass computes the same deadline and collides.
    let second = db
        .reminders
        .schedule_for_lead(lead_id, "sla_overdue", deadline, Utc::now())
        .await
        .unwrap();
    assert!(second.is_none());

    let events = db.leads.events(lead_id).await.unwrap();
    let scheduled_events: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "lead.reminder.scheduled")
        .collect();
    assert_eq!(scheduled_events.len(), 1);
}

#[tokio::test]
#[ignore]
async fn contacting_lead_cancels_scheduled_reminders() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let lead_id = db
        .leads
        .create(CreateLeadRequest {
            tenant_id,
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
            phone: String::new(),
            status: "new".to_string(),
        })
        .await
        .unwrap();

    sqlx::query("UPDATE lead SET next_action_at = $2 WHERE id = $1")
        .bind(lead_id)
        .bind(Utc::now() - Duration::minutes(10))
        .execute(&db.pool)
        .await
        .unwrap();

    let lead = db.leads.get(lead_id).await.unwrap();
    let deadline = botforge_db::truncate_to_minute(lead.next_action_at.unwrap());
    let reminder_id = db
        .reminders
        .schedule_for_lead(lead_id, "sla_overdue", deadline, Utc::now())
        .await
        .unwrap()
        .expect("reminder scheduled");

    db.leads
        .touch(lead_id, EventSource::Dashboard, None)
        .await
        .unwrap();

    let reminder = db.reminders.get(reminder_id).await.unwrap();
    assert_eq!(reminder.status, ReminderStatus::Canceled);

    // The deadline moved forward, so the lead is no longer due.
    let lead = db.leads.get(lead_id).await.unwrap();
    assert!(lead.last_contacted_at.is_some());
    assert!(lead.next_action_at.unwrap() > Utc::now());

    let events = db.leads.events(lead_id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "lead.contacted"));
}

#[tokio::test]
#[ignore]
async fn claimed_reminder_is_leased_against_second_scan() {
    let _guard = CLAIM_LOCK.lock().await;
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let lead_id = db
        .leads
        .create(CreateLeadRequest {
            tenant_id,
            name: "Mira".to_string(),
            email: "mira@example.com".to_string(),
            phone: String::new(),
            status: "new".to_string(),
        })
        .await
        .unwrap();

    sqlx::query("UPDATE lead SET next_action_at = $2 WHERE id = $1")
        .bind(lead_id)
        .bind(Utc::now() - Duration::minutes(10))
        .execute(&db.pool)
        .await
        .unwrap();

    let lead = db.leads.get(lead_id).await.unwrap();
    let deadline = botforge_db::truncate_to_minute(lead.next_action_at.unwrap());
    let reminder_id = db
        .reminders
        .schedule_for_lead(lead_id, "sla_overdue", deadline, Utc::now())
        .await
        .unwrap()
        .expect("reminder scheduled");

    let now = Utc::now();
    let first_scan = db.reminders.claim_due(now, 10).await.unwrap();
    assert!(first_scan.iter().any(|r| r.id == reminder_id));

    let second_scan = db.reminders.claim_due(now, 10).await.unwrap();
    assert!(!second_scan.iter().any(|r| r.id == reminder_id));
}

#[tokio::test]
#[ignore]
async fn sent_reminder_ignores_late_failure() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let lead_id = db
        .leads
        .create(CreateLeadRequest {
            tenant_id,
            name: "Noor".to_string(),
            email: "noor@example.com".to_string(),
            phone: String::new(),
            status: "new".to_string(),
        })
        .await
        .unwrap();

    sqlx::query("UPDATE lead SET next_action_at = $2 WHERE id = $1")
        .bind(lead_id)
        .bind(Utc::now() - Duration::minutes(10))
        .execute(&db.pool)
        .await
        .unwrap();

    let lead = db.leads.get(lead_id).await.unwrap();
    let deadline = botforge_db::truncate_to_minute(lead.next_action_at.unwrap());
    let reminder_id = db
        .reminders
        .schedule_for_lead(lead_id, "sla_overdue", deadline, Utc::now())
        .await
        .unwrap()
        .expect("reminder scheduled");
    let reminder = db.reminders.get(reminder_id).await.unwrap();

    db.reminders.mark_sent(&reminder, 1, "email").await.unwrap();

    // A slower worker reporting a terminal failure afterwards must neither
    // flip the status nor append a failure event.
    db.reminders
        .record_failure(&reminder, 2, "smtp timeout", None)
        .await
        .unwrap();

    let reminder = db.reminders.get(reminder_id).await.unwrap();
    assert_eq!(reminder.status, ReminderStatus::Sent);
    assert_eq!(reminder.attempts, 1);

    let events = db.leads.events(lead_id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "lead.reminder.sent"));
    assert!(!events.iter().any(|e| e.event_type == "lead.reminder.failed"));
}

#[tokio::test]
#[ignore]
async fn schedule_skips_lead_no_longer_due() {
    let db = db().await;
    let tenant_id = Uuid::new_v4();
    let lead_id = db
        .leads
        .create(CreateLeadRequest {
            tenant_id,
            name: "Lin".to_string(),
            email: "lin@example.com".to_string(),
            phone: String::new(),
            status: "new".to_string(),
        })
        .await
        .unwrap();

    // Deadline in the future: the precondition re-check must refuse.
    let future = Utc::now() + Duration::minutes(30);
    let scheduled = db
        .reminders
        .schedule_for_lead(lead_id, "sla_overdue", future, Utc::now())
        .await
        .unwrap();
    assert!(scheduled.is_none());
}
