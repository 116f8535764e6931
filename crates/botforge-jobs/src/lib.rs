//! # botforge-jobs
//!
//! Background processing for botforge: the ingestion worker, the webhook
//! and reminder delivery machinery, the due-work scheduler, and the chat
//! answering service that reads what ingestion produced.

pub mod chat;
pub mod delivery;
pub mod extract;
pub mod ingestion;
pub mod scheduler;
pub mod worker;

pub use chat::ChatService;
pub use delivery::{
    classify_http_status, EmailSender, NoopEmailSender, ReminderDeliverer, WebhookDeliverer,
    EVENT_HEADER, LEAD_REMINDER_DUE_EVENT, SIGNATURE_HEADER,
};
pub use extract::{html_to_text, Extractor};
pub use ingestion::{IngestionRunner, RunOutcome};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, TickStats, REMINDER_REASON_SLA};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
