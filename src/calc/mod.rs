//! Grade aggregation engine.
//!
//! Pure functions over records the caller already holds. Nothing in here
//! reads the workspace database or keeps state between calls.

pub mod aggregate;
pub mod binder;
pub mod guard;
pub mod policy;
pub mod resolve;

use crate::model::{Assignment, DateRange, Grade, GradingSystem};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use aggregate::{aggregate, Aggregate, AggregateQuery};
pub use binder::{can_attach_assignment, can_grade, lesson_slots_with_assignments, resolve_assignment, BoundSlot};
pub use guard::{submit_grade, Submission};
pub use policy::{classify, FivePointSettings};
pub use resolve::{averages_agree, AverageKey, RemoteAverages, ResolvedAverage};

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageFilters {
    pub subgroup_id: Option<String>,
    #[serde(flatten)]
    pub range: DateRange,
}

fn parse_date(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Option<NaiveDate>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CalcError::new(
                    "bad_params",
                    format!("{} must be a YYYY-MM-DD string", key),
                ));
            };
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            // Accept full timestamps too; only the day matters.
            let day = t.get(..10).unwrap_or(t);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| {
                    CalcError::new("bad_params", format!("{} must be a YYYY-MM-DD string", key))
                })
        }
    }
}

/// Reads `subgroupId`, `fromDate` and `toDate` off a params object.
/// A blank or `"ALL"` subgroup means the unscoped aggregate.
pub fn parse_average_filters(raw: &serde_json::Value) -> Result<AverageFilters, CalcError> {
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "params must be an object"));
    };

    let subgroup_id = match obj.get("subgroupId") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CalcError::new(
                    "bad_params",
                    "subgroupId must be string or null",
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                None
            } else {
                Some(t.to_string())
            }
        }
    };

    let from = parse_date(obj, "fromDate")?;
    let to = parse_date(obj, "toDate")?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            let mut e = CalcError::new("bad_params", "fromDate must not be after toDate");
            e.details = Some(serde_json::json!({ "fromDate": f, "toDate": t }));
            return Err(e);
        }
    }

    Ok(AverageFilters {
        subgroup_id,
        range: DateRange { from, to },
    })
}

/// The one place every view gets a subject average from: remote first, then
/// the local aggregate over the same records. The aggregate is returned when
/// it was computed, so callers can report its counts without a second pass.
pub fn subject_average(
    remote: Option<&dyn RemoteAverages>,
    key: &AverageKey,
    grading_system: GradingSystem,
    grades: &[Grade],
    assignments: &[Assignment],
    five_point: &FivePointSettings,
) -> (ResolvedAverage, Option<Aggregate>) {
    let mut computed = None;
    let resolved = resolve::resolve_subject_average(remote, key, || {
        let agg = local_aggregate(key, grading_system, grades, assignments, five_point);
        let avg = agg.to_subject_average();
        computed = Some(agg);
        avg
    });
    (resolved, computed)
}

pub fn local_aggregate(
    key: &AverageKey,
    grading_system: GradingSystem,
    grades: &[Grade],
    assignments: &[Assignment],
    five_point: &FivePointSettings,
) -> Aggregate {
    let query = AggregateQuery {
        student_id: &key.student_id,
        subject_id: &key.subject_id,
        subgroup_id: key.subgroup_id.as_deref(),
        grading_system,
        range: key.range,
    };
    aggregate(grades, &query, assignments, five_point)
}
