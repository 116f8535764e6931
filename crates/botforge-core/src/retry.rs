//! Shared retry engine for outbound delivery work.
//!
//! Webhook deliveries and lead reminders follow the same attempt lifecycle:
//! increment the attempt counter, perform the external call, classify the
//! result, then either finish, schedule a retry on the backoff ladder, or
//! fail terminally. The classification and disposition logic here is pure so
//! both kinds of work share it exactly.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::defaults::{BACKOFF_SCHEDULE_MINUTES, MAX_DELIVERY_ATTEMPTS};

/// Minutes to wait before the next attempt, given the attempt count so far.
/// The schedule caps at its last entry (12 hours).
pub fn backoff_minutes(attempts: i32) -> i64 {
    let idx = attempts.max(0) as usize;
    let idx = idx.min(BACKOFF_SCHEDULE_MINUTES.len() - 1);
    BACKOFF_SCHEDULE_MINUTES[idx]
}

/// Classified result of one external delivery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The receiver accepted the payload.
    Success,
    /// Transient failure (HTTP 429, any 5xx, transport error). Worth retrying.
    Retryable(String),
    /// Permanent failure (any other 4xx). Retrying cannot help.
    Permanent(String),
}

/// What to do with a work item after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Mark the item delivered.
    Delivered,
    /// Keep the item pending and try again at the given time.
    RetryAt { at: DateTime<Utc>, error: String },
    /// Mark the item terminally failed.
    Failed { error: String },
}

/// Decide the fate of a work item from the outcome of an attempt.
///
/// `attempts` is the counter value after this attempt was counted. A
/// retryable failure at or past [`MAX_DELIVERY_ATTEMPTS`] becomes terminal;
/// below it, the next attempt is placed on the backoff ladder indexed by the
/// same counter.
pub fn dispose(outcome: AttemptOutcome, attempts: i32, now: DateTime<Utc>) -> Disposition {
    match outcome {
        AttemptOutcome::Success => Disposition::Delivered,
        AttemptOutcome::Permanent(error) => Disposition::Failed { error },
        AttemptOutcome::Retryable(error) => {
            if attempts >= MAX_DELIVERY_ATTEMPTS {
                Disposition::Failed { error }
            } else {
                Disposition::RetryAt {
                    at: now + Duration::minutes(backoff_minutes(attempts)),
                    error,
                }
            }
        }
    }
}

/// Common surface of retryable delivery rows (webhook deliveries, lead
/// reminders). Lets the scheduler and the attempt loop stay kind-agnostic.
pub trait RetryableWorkItem {
    fn id(&self) -> Uuid;
    fn tenant_id(&self) -> Uuid;
    fn attempts(&self) -> i32;
    fn next_attempt_at(&self) -> Option<DateTime<Utc>>;
    /// Whether the item has reached a final state and must never run again.
    fn is_terminal(&self) -> bool;

    /// Whether the item is eligible to run now. A missing `next_attempt_at`
    /// means "as soon as possible".
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.next_attempt_at().map_or(true, |at| at <= now)
    }
}
