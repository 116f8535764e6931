//! Domain models for the botforge work-processing subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// Knowledge sources & ingestion
// =============================================================================

/// Kind of payload a knowledge source carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Url,
    File,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Url => "url",
            SourceType::File => "file",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "url" => SourceType::Url,
            "file" => SourceType::File,
            _ => SourceType::Text, // fallback
        }
    }
}

/// A tenant-scoped piece of knowledge-base content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_type: SourceType,
    pub title: String,
    pub input_text: String,
    pub input_url: String,
    /// Raw uploaded bytes for file sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<Vec<u8>>,
    pub input_filename: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Overall lifecycle status of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Queued, // fallback
        }
    }

    /// Whether the status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Pipeline stage within a running ingestion job.
///
/// Stages advance monotonically; each stage write is committed separately so
/// observers can poll progress mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Queued,
    Cleanup,
    Extract,
    Chunk,
    Index,
    Done,
    Failed,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Queued => "queued",
            IngestStage::Cleanup => "cleanup",
            IngestStage::Extract => "extract",
            IngestStage::Chunk => "chunk",
            IngestStage::Index => "index",
            IngestStage::Done => "done",
            IngestStage::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "cleanup" => IngestStage::Cleanup,
            "extract" => IngestStage::Extract,
            "chunk" => IngestStage::Chunk,
            "index" => IngestStage::Index,
            "done" => IngestStage::Done,
            "failed" => IngestStage::Failed,
            _ => IngestStage::Queued, // fallback
        }
    }

    /// Progress percentage reported when this stage begins.
    pub fn progress_percent(&self) -> i16 {
        match self {
            IngestStage::Queued => 0,
            IngestStage::Cleanup => 5,
            IngestStage::Extract => 20,
            IngestStage::Chunk => 55,
            IngestStage::Index => 80,
            IngestStage::Done => 100,
            IngestStage::Failed => 0,
        }
    }
}

/// A unit of knowledge-source ingestion work.
///
/// Never deleted; corrections are appended as new jobs. Mutated only by the
/// worker executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_id: Uuid,
    /// Caller-supplied dedup token; empty means unconstrained.
    pub idempotency_key: String,
    pub status: JobStatus,
    pub stage: IngestStage,
    pub progress_percent: i16,
    pub attempts: i32,
    pub error_code: String,
    pub error_message: String,
    pub last_error_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Webhooks
// =============================================================================

/// A tenant-registered outbound webhook receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    /// Shared HMAC secret. Surfaced to the caller only at creation time.
    #[serde(default, skip_serializing)]
    pub secret: String,
    pub is_active: bool,
    /// Subscribed event types; empty means all events.
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// Whether this endpoint wants the given event type.
    pub fn allows(&self, event_type: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event_type)
    }
}

/// Delivery status of one event fan-out to one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "sent" => DeliveryStatus::Sent,
            "failed" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Pending, // fallback
        }
    }
}

/// One event occurrence fanned out to one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub endpoint_id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_http_status: Option<i32>,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWebhookEndpointRequest {
    pub tenant_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
}

// =============================================================================
// Leads, reminders, events
// =============================================================================

/// The subset of a lead the reminder scheduler operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: String,
    pub assigned_to: Option<Uuid>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub next_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of a lead reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Sent,
    Canceled,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Scheduled => "scheduled",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Canceled => "canceled",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "sent" => ReminderStatus::Sent,
            "canceled" => ReminderStatus::Canceled,
            "failed" => ReminderStatus::Failed,
            _ => ReminderStatus::Scheduled, // fallback
        }
    }
}

/// A scheduled follow-up reminder for a lead.
///
/// At most one row exists per (tenant, lead, reason, scheduled_for); the
/// unique constraint absorbs concurrent scheduler passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadReminder {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Uuid,
    pub reason: String,
    pub status: ReminderStatus,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: String,
    pub last_channel: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-tenant SLA policy override: lead status → minutes until follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSlaPolicy {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub is_enabled: bool,
    pub minutes_by_status: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Origin of a lead event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    System,
    Public,
    Dashboard,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::System => "system",
            EventSource::Public => "public",
            EventSource::Dashboard => "dashboard",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => EventSource::Public,
            "dashboard" => EventSource::Dashboard,
            _ => EventSource::System, // fallback
        }
    }
}

/// Append-only ledger row describing a state change on a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Uuid,
    pub event_type: String,
    pub source: EventSource,
    pub actor_user_id: Option<Uuid>,
    pub data: JsonValue,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Retrieval
// =============================================================================

/// A scored chunk returned by the search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub score: f64,
}

/// A retrieval result surfaced to the end user as an answer source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub title: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn test_job_status_unknown_falls_back_to_queued() {
        assert_eq!(JobStatus::from_str_lossy("bogus"), JobStatus::Queued);
        assert_eq!(JobStatus::from_str_lossy(""), JobStatus::Queued);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_ingest_stage_round_trip() {
        for stage in [
            IngestStage::Queued,
            IngestStage::Cleanup,
            IngestStage::Extract,
            IngestStage::Chunk,
            IngestStage::Index,
            IngestStage::Done,
            IngestStage::Failed,
        ] {
            assert_eq!(IngestStage::from_str_lossy(stage.as_str()), stage);
        }
    }

    #[test]
    fn test_ingest_stage_progress_ladder() {
        assert_eq!(IngestStage::Cleanup.progress_percent(), 5);
        assert_eq!(IngestStage::Extract.progress_percent(), 20);
        assert_eq!(IngestStage::Chunk.progress_percent(), 55);
        assert_eq!(IngestStage::Index.progress_percent(), 80);
        assert_eq!(IngestStage::Done.progress_percent(), 100);
    }

    #[test]
    fn test_endpoint_allows_empty_events_means_all() {
        let ep = WebhookEndpoint {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://example.com/hook".into(),
            secret: "s".into(),
            is_active: true,
            events: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ep.allows("lead.reminder.due"));
        assert!(ep.allows("anything.else"));
    }

    #[test]
    fn test_endpoint_allows_filters_by_subscription() {
        let ep = WebhookEndpoint {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://example.com/hook".into(),
            secret: "s".into(),
            is_active: true,
            events: vec!["lead.reminder.due".into()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ep.allows("lead.reminder.due"));
        assert!(!ep.allows("lead.created"));
    }

    #[test]
    fn test_endpoint_secret_not_serialized() {
        let ep = WebhookEndpoint {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            url: "https://example.com/hook".into(),
            secret: "super-secret".into(),
            is_active: true,
            events: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&ep).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_reminder_status_round_trip() {
        for status in [
            ReminderStatus::Scheduled,
            ReminderStatus::Sent,
            ReminderStatus::Canceled,
            ReminderStatus::Failed,
        ] {
            assert_eq!(ReminderStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn test_source_type_round_trip() {
        for st in [SourceType::Text, SourceType::Url, SourceType::File] {
            assert_eq!(SourceType::from_str_lossy(st.as_str()), st);
        }
    }
}
