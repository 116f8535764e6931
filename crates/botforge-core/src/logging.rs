//! Structured logging schema and field name constants for botforge.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (search hits, chunks) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Tenant UUID scoping the operation.
pub const TENANT_ID: &str = "tenant_id";

/// Subsystem originating the log event.
/// Values: "db", "search", "jobs", "scheduler"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "worker", "ingestion", "webhook_delivery"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_queued", "upsert_chunks", "deliver", "schedule"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Ingestion job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Knowledge source UUID being ingested.
pub const SOURCE_ID: &str = "source_id";

/// Webhook delivery UUID being attempted.
pub const DELIVERY_ID: &str = "delivery_id";

/// Lead reminder UUID being attempted.
pub const REMINDER_ID: &str = "reminder_id";

/// Lead UUID a reminder or event refers to.
pub const LEAD_ID: &str = "lead_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of chunks produced or indexed.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Number of results returned by a search or scan.
pub const RESULT_COUNT: &str = "result_count";

/// Delivery attempt number (after increment).
pub const ATTEMPTS: &str = "attempts";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// HTTP status observed on an outbound call.
pub const HTTP_STATUS: &str = "http_status";
