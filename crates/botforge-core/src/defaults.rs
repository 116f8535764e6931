//! Centralized default constants for the botforge system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates and the worker binary should reference these constants
//! instead of defining their own magic numbers.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for knowledge-source text splitting.
pub const CHUNK_MAX_CHARS: usize = 900;

/// Overlap characters between adjacent chunks for context preservation.
pub const CHUNK_OVERLAP: usize = 120;

// =============================================================================
// RETRIEVAL / ANSWER COMPOSITION
// =============================================================================

/// Number of candidate chunks fetched per retrieval query.
pub const RETRIEVAL_TOP_K: usize = 8;

/// Minimum relevance score a hit must reach to be used in an answer.
pub const RETRIEVAL_MIN_SCORE: f64 = 0.8;

/// Queries shorter than this (after trim) return no results.
pub const RETRIEVAL_MIN_QUERY_CHARS: usize = 3;

/// Hard overall cap on a composed reply, in characters.
pub const REPLY_MAX_CHARS: usize = 1400;

/// Per-chunk truncation length inside a composed reply.
pub const REPLY_PER_CHUNK_CHARS: usize = 700;

/// Maximum number of chunks concatenated into one reply.
pub const REPLY_MAX_CHUNKS: usize = 3;

/// Maximum number of distinct sources cited per answer.
pub const REPLY_MAX_SOURCES: usize = 3;

// =============================================================================
// DELIVERY RETRY
// =============================================================================

/// Exponential backoff schedule in minutes, indexed by attempt count.
/// The last entry (12 hours) caps all further retries.
pub const BACKOFF_SCHEDULE_MINUTES: [i64; 6] = [1, 5, 15, 60, 180, 720];

/// Attempt ceiling after which a delivery is terminally failed.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 6;

/// Timeout for an outbound webhook POST, in seconds.
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Lease placed on a claimed delivery or reminder, in seconds. While the
/// lease holds, a concurrent due-work scan will not pick the row up again;
/// if the claiming worker dies mid-attempt the row becomes due once the
/// lease expires.
pub const CLAIM_LEASE_SECS: i64 = 120;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Timeout for fetching a URL source, in seconds.
pub const URL_FETCH_TIMEOUT_SECS: u64 = 20;

/// User-Agent header sent when fetching URL sources.
pub const URL_FETCH_USER_AGENT: &str = "botforge-ingest/1.0";

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Default search-index base URL (OpenSearch-compatible).
pub const INDEX_BASE_URL: &str = "http://localhost:9200";

/// Default knowledge-chunk index name.
pub const INDEX_NAME: &str = "kb_chunks_v1";

/// Timeout for search-index requests, in seconds.
pub const INDEX_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default polling interval for the worker when the queue is empty (ms).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default maximum number of concurrently executing jobs.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Per-job execution timeout in seconds.
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// Worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Maximum stored length of a captured error message, in characters.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 2000;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Interval between due-work scans, in seconds.
pub const SCHEDULER_SCAN_INTERVAL_SECS: u64 = 300;

/// Maximum rows picked up per due-work scan pass.
pub const SCHEDULER_BATCH_SIZE: i64 = 200;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Error code for a job whose source was deactivated before execution.
pub const ERROR_CODE_SOURCE_INACTIVE: &str = "SOURCE_INACTIVE";

/// Error code for any extraction/chunk/index failure during ingestion.
pub const ERROR_CODE_INGESTION_FAILED: &str = "INGESTION_FAILED";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_caps_at_twelve_hours() {
        assert_eq!(BACKOFF_SCHEDULE_MINUTES[BACKOFF_SCHEDULE_MINUTES.len() - 1], 720);
    }

    #[test]
    fn test_overlap_smaller_than_chunk_size() {
        assert!(CHUNK_OVERLAP < CHUNK_MAX_CHARS);
    }
}
