//! Field-level change detection between two versions of a record.
//!
//! Records are compared as JSON objects. Equality is structural: object key
//! order never matters and numbers compare by value, so `100` and `100.0`
//! are the same amount.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;

/// Fields never reported as changed: identifiers and audit bookkeeping.
pub const IGNORED_FIELDS: &[&str] = &[
    "id",
    "_id",
    "_creationTime",
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "aggregate_version",
];

const BUDGET_FIELD: &str = "total_budget_allocated";
const STATUS_FIELD: &str = "status";
const SCHEDULE_FIELD: &str = "target_date_completion";
const MANAGER_FIELD: &str = "project_manager_id";

/// Flags for the changes reviewers care about, with old and new values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    #[serde(default, skip_serializing_if = "is_false")]
    /// `total_budget_allocated` changed
    pub budget_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Allocation before
    pub old_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Allocation after
    pub new_budget: Option<f64>,

    #[serde(default, skip_serializing_if = "is_false")]
    /// `status` changed
    pub status_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Status before
    pub old_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Status after
    pub new_status: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    /// `target_date_completion` changed
    pub schedule_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Target date before
    pub old_schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Target date after
    pub new_schedule: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    /// `project_manager_id` changed
    pub manager_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Manager before
    pub old_manager: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Manager after
    pub new_manager: Option<i64>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Result of comparing two record versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Names of the fields whose values differ, sorted
    pub changed_fields: Vec<String>,
    /// Tracked-field summary
    pub summary: ChangeSummary,
}

impl ChangeSet {
    /// True when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields.is_empty()
    }
}

/// Compares two versions of a record.
///
/// A missing side (pure create or pure delete) or a side that is not an
/// object yields an empty change set; those cases are recorded as snapshots.
#[must_use]
pub fn diff(previous: Option<&Value>, new: Option<&Value>) -> ChangeSet {
    let (Some(Value::Object(prev)), Some(Value::Object(next))) = (previous, new) else {
        return ChangeSet::default();
    };

    let keys: BTreeSet<&String> = prev.keys().chain(next.keys()).collect();
    let changed_fields: Vec<String> = keys
        .into_iter()
        .filter(|key| !IGNORED_FIELDS.contains(&key.as_str()))
        .filter(|key| !field_equal(prev, next, key))
        .cloned()
        .collect();

    let changed = |field: &str| changed_fields.iter().any(|f| f == field);
    let mut summary = ChangeSummary::default();

    if changed(BUDGET_FIELD) {
        summary.budget_changed = true;
        summary.old_budget = prev.get(BUDGET_FIELD).and_then(Value::as_f64);
        summary.new_budget = next.get(BUDGET_FIELD).and_then(Value::as_f64);
    }
    if changed(STATUS_FIELD) {
        summary.status_changed = true;
        summary.old_status = text(prev.get(STATUS_FIELD));
        summary.new_status = text(next.get(STATUS_FIELD));
    }
    if changed(SCHEDULE_FIELD) {
        summary.schedule_changed = true;
        summary.old_schedule = text(prev.get(SCHEDULE_FIELD));
        summary.new_schedule = text(next.get(SCHEDULE_FIELD));
    }
    if changed(MANAGER_FIELD) {
        summary.manager_changed = true;
        summary.old_manager = prev.get(MANAGER_FIELD).and_then(Value::as_i64);
        summary.new_manager = next.get(MANAGER_FIELD).and_then(Value::as_i64);
    }

    ChangeSet {
        changed_fields,
        summary,
    }
}

// An absent key and an explicit null are the same "no value".
fn field_equal(prev: &Map<String, Value>, next: &Map<String, Value>, key: &str) -> bool {
    let a = prev.get(key).unwrap_or(&Value::Null);
    let b = next.get(key).unwrap_or(&Value::Null);
    deep_equal(a, b)
}

/// Structural equality with numeric comparison by value.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

// Integers compare exactly; f64 is only used once a float is involved.
#[allow(clippy::float_cmp)]
fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    if !(x.is_f64() || y.is_f64()) {
        return false;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_budget_change_is_summarized() {
        let prev = json!({"total_budget_allocated": 100, "status": "ongoing"});
        let next = json!({"total_budget_allocated": 150, "status": "ongoing"});

        let changes = diff(Some(&prev), Some(&next));
        assert_eq!(changes.changed_fields, vec!["total_budget_allocated"]);
        assert!(changes.summary.budget_changed);
        assert_eq!(changes.summary.old_budget, Some(100.0));
        assert_eq!(changes.summary.new_budget, Some(150.0));
        assert!(!changes.summary.status_changed);
    }

    #[test]
    fn test_missing_side_yields_no_diff() {
        let record = json!({"name": "Bridge"});
        assert!(diff(None, Some(&record)).is_empty());
        assert!(diff(Some(&record), None).is_empty());
        assert!(diff(None, None).is_empty());
    }

    #[test]
    fn test_ignored_fields_never_reported() {
        let prev = json!({"id": 1, "updated_at": "2024-01-01T00:00:00Z", "updated_by": 1, "name": "A"});
        let next = json!({"id": 2, "updated_at": "2024-02-01T00:00:00Z", "updated_by": 2, "name": "A"});
        assert!(diff(Some(&prev), Some(&next)).is_empty());
    }

    #[test]
    fn test_status_schedule_and_manager_changes() {
        let prev = json!({
            "status": "ongoing",
            "target_date_completion": "2024-06-30",
            "project_manager_id": null
        });
        let next = json!({
            "status": "delayed",
            "target_date_completion": "2024-09-30",
            "project_manager_id": 7
        });

        let changes = diff(Some(&prev), Some(&next));
        assert_eq!(
            changes.changed_fields,
            vec!["project_manager_id", "status", "target_date_completion"]
        );
        let s = &changes.summary;
        assert!(s.status_changed && s.schedule_changed && s.manager_changed);
        assert_eq!(s.old_status.as_deref(), Some("ongoing"));
        assert_eq!(s.new_status.as_deref(), Some("delayed"));
        assert_eq!(s.new_schedule.as_deref(), Some("2024-09-30"));
        assert_eq!(s.old_manager, None);
        assert_eq!(s.new_manager, Some(7));
    }

    #[test]
    fn test_nested_values_compare_structurally() {
        let prev = json!({"meta": {"a": 1, "b": [1, 2]}, "x": 1});
        let next = json!({"meta": {"b": [1.0, 2.0], "a": 1.0}, "x": 1.0});
        assert!(diff(Some(&prev), Some(&next)).is_empty());
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let prev = json!({"project_manager_id": 9_007_199_254_740_993_i64});
        let next = json!({"project_manager_id": 9_007_199_254_740_992_i64});
        let changes = diff(Some(&prev), Some(&next));
        assert_eq!(changes.changed_fields, vec!["project_manager_id"]);
        assert!(changes.summary.manager_changed);

        let big = json!({"budget_item_id": u64::MAX});
        assert!(diff(Some(&big), Some(&big.clone())).is_empty());
        assert!(!deep_equal(&json!(u64::MAX), &json!(-1)));
    }

    #[test]
    fn test_added_and_removed_keys_are_changes() {
        let prev = json!({"remarks": "late", "barangay": null});
        let next = json!({"district": "II"});
        assert_eq!(
            diff(Some(&prev), Some(&next)).changed_fields,
            vec!["district", "remarks"]
        );
    }

    #[test]
    fn test_summary_serialization_omits_unset_fields() {
        let summary = ChangeSummary {
            status_changed: true,
            old_status: Some("ongoing".to_string()),
            new_status: Some("completed".to_string()),
            ..ChangeSummary::default()
        };
        let raw = serde_json::to_string(&summary).unwrap_or_default();
        assert_eq!(
            raw,
            r#"{"status_changed":true,"old_status":"ongoing","new_status":"completed"}"#
        );
    }

    proptest! {
        #[test]
        fn prop_record_never_differs_from_itself(
            budget in 0.0..1.0e9f64,
            status in "(ongoing|delayed|completed)",
            name in "[a-zA-Z ]{0,20}",
        ) {
            let record = json!({"total_budget_allocated": budget, "status": status, "name": name});
            prop_assert!(diff(Some(&record), Some(&record.clone())).is_empty());
        }
    }
}
