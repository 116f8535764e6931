//! Lead follow-up SLA policy evaluation.
//!
//! Each lead status maps to a number of minutes within which the lead should
//! be contacted. Tenants may override individual statuses; a value of zero or
//! less disables the reminder for that status.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::Value as JsonValue;

/// Built-in minutes-by-status schedule applied when a tenant has no override.
pub fn default_sla_minutes() -> HashMap<String, i64> {
    HashMap::from([
        ("new".to_string(), 60),
        ("open".to_string(), 240),
        ("qualified".to_string(), 1440),
        ("closed".to_string(), 0),
    ])
}

/// Merge a tenant's stored override map onto the defaults.
///
/// Keys are lowercased. Entries whose value is not numeric are ignored rather
/// than rejected, so a malformed policy row degrades to the defaults instead
/// of breaking scheduling for the tenant.
pub fn merge_sla_minutes(overrides: &JsonValue) -> HashMap<String, i64> {
    let mut merged = default_sla_minutes();
    if let Some(map) = overrides.as_object() {
        for (key, value) in map {
            let minutes = match value {
                JsonValue::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64)),
                _ => None,
            };
            if let Some(minutes) = minutes {
                merged.insert(key.to_lowercase(), minutes);
            }
        }
    }
    merged
}

/// Zero out the seconds and sub-second fields of a timestamp.
///
/// Reminder deadlines are minute-granular so that two scheduler passes over
/// the same lead compute byte-identical `scheduled_for` values and collide on
/// the dedup constraint instead of double-scheduling.
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Compute the follow-up deadline for a lead, or `None` when its status has
/// no SLA (unknown status, or configured minutes of zero or less).
///
/// The deadline anchors on the last contact time when one exists, otherwise
/// on the lead's creation time, otherwise on `now`.
pub fn compute_next_action_at(
    status: &str,
    last_contacted_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    minutes_by_status: &HashMap<String, i64>,
) -> Option<DateTime<Utc>> {
    let minutes = *minutes_by_status.get(&status.to_lowercase())?;
    if minutes <= 0 {
        return None;
    }
    let anchor = last_contacted_at.or(created_at).unwrap_or(now);
    Some(truncate_to_minute(anchor + Duration::minutes(minutes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_defaults_cover_known_statuses() {
        let defaults = default_sla_minutes();
        assert_eq!(defaults["new"], 60);
        assert_eq!(defaults["open"], 240);
        assert_eq!(defaults["qualified"], 1440);
        assert_eq!(defaults["closed"], 0);
    }

    #[test]
    fn test_merge_overrides_single_status() {
        let merged = merge_sla_minutes(&json!({"new": 30}));
        assert_eq!(merged["new"], 30);
        assert_eq!(merged["open"], 240);
    }

    #[test]
    fn test_merge_lowercases_keys() {
        let merged = merge_sla_minutes(&json!({"NEW": 15}));
        assert_eq!(merged["new"], 15);
    }

    #[test]
    fn test_merge_skips_non_numeric_values() {
        let merged = merge_sla_minutes(&json!({"new": "soon", "open": null, "qualified": 10}));
        assert_eq!(merged["new"], 60);
        assert_eq!(merged["open"], 240);
        assert_eq!(merged["qualified"], 10);
    }

    #[test]
    fn test_merge_accepts_extra_statuses() {
        let merged = merge_sla_minutes(&json!({"proposal": 120}));
        assert_eq!(merged["proposal"], 120);
    }

    #[test]
    fn test_merge_non_object_yields_defaults() {
        assert_eq!(merge_sla_minutes(&json!(null)), default_sla_minutes());
        assert_eq!(merge_sla_minutes(&json!([1, 2])), default_sla_minutes());
    }

    #[test]
    fn test_truncate_drops_seconds() {
        assert_eq!(truncate_to_minute(at(10, 30, 45)), at(10, 30, 0));
        assert_eq!(truncate_to_minute(at(10, 30, 0)), at(10, 30, 0));
    }

    #[test]
    fn test_deadline_anchors_on_last_contacted() {
        let minutes = default_sla_minutes();
        let deadline = compute_next_action_at(
            "new",
            Some(at(9, 0, 30)),
            Some(at(8, 0, 0)),
            at(12, 0, 0),
            &minutes,
        );
        assert_eq!(deadline, Some(at(10, 0, 0)));
    }

    #[test]
    fn test_deadline_falls_back_to_created_at() {
        let minutes = default_sla_minutes();
        let deadline =
            compute_next_action_at("open", None, Some(at(8, 15, 59)), at(12, 0, 0), &minutes);
        assert_eq!(deadline, Some(at(12, 15, 0)));
    }

    #[test]
    fn test_deadline_falls_back_to_now() {
        let minutes = default_sla_minutes();
        let deadline = compute_next_action_at("new", None, None, at(14, 5, 10), &minutes);
        assert_eq!(deadline, Some(at(15, 5, 0)));
    }

    #[test]
    fn test_zero_minutes_disables_reminder() {
        let minutes = default_sla_minutes();
        assert_eq!(
            compute_next_action_at("closed", None, Some(at(8, 0, 0)), at(12, 0, 0), &minutes),
            None
        );
    }

    #[test]
    fn test_negative_override_disables_reminder() {
        let minutes = merge_sla_minutes(&json!({"new": -5}));
        assert_eq!(
            compute_next_action_at("new", None, None, at(12, 0, 0), &minutes),
            None
        );
    }

    #[test]
    fn test_unknown_status_has_no_deadline() {
        let minutes = default_sla_minutes();
        assert_eq!(
            compute_next_action_at("archived", None, None, at(12, 0, 0), &minutes),
            None
        );
    }

    #[test]
    fn test_status_lookup_is_case_insensitive() {
        let minutes = default_sla_minutes();
        assert!(compute_next_action_at("NEW", None, None, at(12, 0, 0), &minutes).is_some());
    }
}
