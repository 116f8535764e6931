//! # botforge-core
//!
//! Core types, defaults, and pure algorithms for the botforge
//! work-processing subsystem.
//!
//! This crate provides the foundational data structures shared by the
//! database, search, and job-processing crates: the error taxonomy, the
//! domain models (ingestion jobs, knowledge sources, webhook deliveries,
//! lead reminders), and the pure algorithms that must behave identically
//! everywhere: chunking, text normalization, webhook signing, SLA deadline
//! computation, and the retry backoff schedule.

pub mod chunker;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod signing;
pub mod sla;
pub mod text;

// Re-export commonly used types at crate root
pub use chunker::chunk_text;
pub use error::{Error, Result};
pub use models::*;
pub use retry::{backoff_minutes, dispose, AttemptOutcome, Disposition, RetryableWorkItem};
pub use signing::{canonical_json, sign_payload};
pub use sla::{compute_next_action_at, merge_sla_minutes, truncate_to_minute};
pub use text::normalize_text;
