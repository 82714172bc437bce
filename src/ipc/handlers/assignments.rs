use crate::calc::{self, Submission};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, insert_err, optional_str, parse_params, query_err, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{number_or_numeric_string, Assignment, AssignmentType};
use crate::store::{self, AssignmentFilter, GradeFilter};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentDraft {
    #[serde(default)]
    id: Option<String>,
    schedule_id: String,
    teacher_id: String,
    #[serde(default)]
    subgroup_id: Option<String>,
    assignment_type: AssignmentType,
    #[serde(deserialize_with = "number_or_numeric_string")]
    max_score: f64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    planned_for: bool,
}

fn check_max_score(req: &Request, max_score: f64) -> Result<f64, serde_json::Value> {
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(err(
            &req.id,
            "bad_params",
            "maxScore must be a positive number",
            Some(json!({ "maxScore": max_score })),
        ));
    }
    Ok(max_score)
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let draft: AssignmentDraft = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let max_score = match check_max_score(req, draft.max_score) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let slot = match store::get_slot(conn, &draft.schedule_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "lesson slot not found",
                Some(json!({ "scheduleId": draft.schedule_id })),
            )
        }
        Err(e) => return query_err(req, e),
    };
    if !calc::can_attach_assignment(&slot, draft.planned_for) {
        return err(
            &req.id,
            "not_conducted",
            "assignments need a conducted lesson unless planned in advance",
            Some(json!({ "scheduleId": slot.id, "status": slot.status })),
        );
    }

    let assignment = Assignment {
        id: draft
            .id
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        schedule_id: slot.id.clone(),
        class_id: slot.class_id.clone(),
        subject_id: slot.subject_id.clone(),
        teacher_id: draft.teacher_id,
        subgroup_id: draft.subgroup_id.or_else(|| slot.subgroup_id.clone()),
        assignment_type: draft.assignment_type,
        max_score,
        description: draft.description,
        planned_for: draft.planned_for,
    };
    match store::get_assignment(conn, &assignment.id) {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "bad_params",
                "assignment already exists; use assignments.update",
                Some(json!({ "assignmentId": assignment.id })),
            )
        }
        Ok(None) => {}
        Err(e) => return query_err(req, e),
    }
    if let Err(e) = store::upsert_assignment(conn, &assignment) {
        return insert_err(req, "assignments", e);
    }
    info!(assignment = %assignment.id, slot = %assignment.schedule_id, "assignment created");
    ok(&req.id, json!({ "assignment": assignment }))
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut assignment = match store::get_assignment(conn, &assignment_id) {
        Ok(Some(a)) => a,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "assignment not found",
                Some(json!({ "assignmentId": assignment_id })),
            )
        }
        Err(e) => return query_err(req, e),
    };

    if let Some(raw) = req.params.get("maxScore").filter(|v| !v.is_null()) {
        let parsed = match number_or_numeric_string(raw.clone()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        };
        assignment.max_score = match check_max_score(req, parsed) {
            Ok(v) => v,
            Err(e) => return e,
        };
    }
    if let Some(raw) = optional_str(req, "assignmentType") {
        let Some(t) = AssignmentType::parse(&raw) else {
            return err(
                &req.id,
                "bad_params",
                "unknown assignmentType",
                Some(json!({ "assignmentType": raw })),
            );
        };
        assignment.assignment_type = t;
    }
    if let Some(v) = req.params.get("description") {
        assignment.description = v.as_str().map(|s| s.to_string());
    }
    if let Some(v) = req.params.get("plannedFor").and_then(|v| v.as_bool()) {
        assignment.planned_for = v;
        match store::get_slot(conn, &assignment.schedule_id) {
            Ok(Some(slot)) if !calc::can_attach_assignment(&slot, v) => {
                return err(
                    &req.id,
                    "not_conducted",
                    "assignments need a conducted lesson unless planned in advance",
                    Some(json!({ "scheduleId": slot.id, "status": slot.status })),
                );
            }
            Ok(_) => {}
            Err(e) => return query_err(req, e),
        }
    }

    let corrections = match regrade_against(conn, req, &assignment) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = store::upsert_assignment(&tx, &assignment) {
        return insert_err(req, "assignments", e);
    }
    for sub in &corrections {
        if let Err(e) = store::upsert_grade(&tx, &sub.accepted) {
            return insert_err(req, "grades", e);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    if !corrections.is_empty() {
        info!(assignment = %assignment.id, count = corrections.len(), "grades clamped to the new maxScore");
    }

    let corrected: Vec<serde_json::Value> = corrections
        .iter()
        .map(|sub| {
            json!({
                "gradeId": sub.accepted.id,
                "score": sub.accepted.score,
                "submittedScore": sub.submitted_score,
                "notice": sub.notice,
            })
        })
        .collect();
    ok(
        &req.id,
        json!({ "assignment": assignment, "correctedGrades": corrected }),
    )
}

/// Runs every grade that resolves to `assignment` back through the guard
/// with the edited ceiling. Returns only the grades whose score moved.
fn regrade_against(
    conn: &Connection,
    req: &Request,
    assignment: &Assignment,
) -> Result<Vec<Submission>, serde_json::Value> {
    let class = match store::get_class(conn, &assignment.class_id) {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!(class = %assignment.class_id, assignment = %assignment.id, "assignment on an unregistered class");
            return Ok(Vec::new());
        }
        Err(e) => return Err(query_err(req, e)),
    };
    let mut siblings = store::list_assignments(
        conn,
        &AssignmentFilter {
            class_id: Some(assignment.class_id.clone()),
            subject_id: Some(assignment.subject_id.clone()),
            ..AssignmentFilter::default()
        },
    )
    .map_err(|e| query_err(req, e))?;
    if let Some(stale) = siblings.iter_mut().find(|a| a.id == assignment.id) {
        *stale = assignment.clone();
    }
    let grades = store::list_grades(
        conn,
        &GradeFilter {
            class_id: Some(assignment.class_id.clone()),
            subject_id: Some(assignment.subject_id.clone()),
            ..GradeFilter::default()
        },
    )
    .map_err(|e| query_err(req, e))?;

    Ok(grades
        .into_iter()
        .filter(|g| calc::resolve_assignment(g, &siblings).map(|a| a.id.as_str()) == Some(assignment.id.as_str()))
        .map(|g| calc::submit_grade(g, class.grading_system, &siblings))
        .filter(|sub| sub.corrected)
        .collect())
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let filter = AssignmentFilter {
        class_id: optional_str(req, "classId"),
        subject_id: optional_str(req, "subjectId"),
        subgroup_id: optional_str(req, "subgroupId"),
        schedule_id: optional_str(req, "scheduleId"),
    };
    match store::list_assignments(conn, &filter) {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => query_err(req, e),
    }
}

/// Grades that resolved to a deleted assignment stay; they fall back to the
/// slot lookup or drop out of cumulative sums. `orphanedGrades` counts them.
fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment = match store::get_assignment(conn, &assignment_id) {
        Ok(Some(a)) => a,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "assignment not found",
                Some(json!({ "assignmentId": assignment_id })),
            )
        }
        Err(e) => return query_err(req, e),
    };
    let siblings = match store::list_assignments(
        conn,
        &AssignmentFilter {
            class_id: Some(assignment.class_id.clone()),
            subject_id: Some(assignment.subject_id.clone()),
            ..AssignmentFilter::default()
        },
    ) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    let grades = match store::list_grades(
        conn,
        &GradeFilter {
            class_id: Some(assignment.class_id.clone()),
            subject_id: Some(assignment.subject_id.clone()),
            ..GradeFilter::default()
        },
    ) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    let orphaned = grades
        .iter()
        .filter(|g| calc::resolve_assignment(g, &siblings).map(|a| a.id.as_str()) == Some(assignment.id.as_str()))
        .count();

    if let Err(e) = store::delete_assignment(conn, &assignment.id) {
        return query_err(req, e);
    }
    if orphaned > 0 {
        warn!(assignment = %assignment.id, orphaned, "deleted assignment still referenced by grades");
    }
    ok(
        &req.id,
        json!({ "assignmentId": assignment.id, "deleted": true, "orphanedGrades": orphaned }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.update" => Some(handle_assignments_update(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        _ => None,
    }
}
