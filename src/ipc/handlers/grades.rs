use crate::calc::{self, BoundSlot, Submission};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, insert_err, load_class, optional_str, parse_filters, parse_params, query_err,
    required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, Grade, GradeType, GradingSystem, LessonStatus};
use crate::store::{self, AssignmentFilter, GradeFilter};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeDraft {
    #[serde(default)]
    id: Option<String>,
    student_id: String,
    subject_id: String,
    class_id: String,
    teacher_id: String,
    score: f64,
    #[serde(default)]
    grade_type: Option<GradeType>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    subgroup_id: Option<String>,
    #[serde(default)]
    schedule_id: Option<String>,
    #[serde(default)]
    assignment_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn subject_assignments(
    conn: &Connection,
    req: &Request,
    class_id: &str,
    subject_id: &str,
) -> Result<Vec<Assignment>, serde_json::Value> {
    store::list_assignments(
        conn,
        &AssignmentFilter {
            class_id: Some(class_id.to_string()),
            subject_id: Some(subject_id.to_string()),
            ..AssignmentFilter::default()
        },
    )
    .map_err(|e| query_err(req, e))
}

fn student_grades(
    conn: &Connection,
    req: &Request,
    student_id: &str,
    subject_id: &str,
) -> Result<Vec<Grade>, serde_json::Value> {
    store::list_grades(
        conn,
        &GradeFilter {
            student_id: Some(student_id.to_string()),
            subject_id: Some(subject_id.to_string()),
            ..GradeFilter::default()
        },
    )
    .map_err(|e| query_err(req, e))
}

fn submission_json(sub: &Submission) -> serde_json::Value {
    json!({
        "grade": sub.accepted,
        "corrected": sub.corrected,
        "notice": sub.notice,
        "submittedScore": sub.submitted_score,
    })
}

fn check_score(req: &Request, score: f64) -> Result<(), serde_json::Value> {
    if !score.is_finite() {
        return Err(err(&req.id, "bad_params", "score must be a finite number", None));
    }
    Ok(())
}

fn handle_grades_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let draft: GradeDraft = match parse_params(req, None) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = check_score(req, draft.score) {
        return e;
    }
    let class = match load_class(conn, req, &draft.class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignments = match subject_assignments(conn, req, &class.id, &draft.subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut grade = Grade {
        id: draft
            .id
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        student_id: draft.student_id,
        subject_id: draft.subject_id,
        class_id: class.id.clone(),
        teacher_id: draft.teacher_id,
        score: draft.score,
        grade_type: GradeType::Classwork,
        comment: draft.comment,
        subgroup_id: draft.subgroup_id,
        schedule_id: draft.schedule_id,
        assignment_id: draft.assignment_id,
        created_at: draft.created_at.unwrap_or_else(Utc::now),
    };
    grade.grade_type = match draft.grade_type {
        Some(t) => t,
        None => calc::resolve_assignment(&grade, &assignments)
            .map(|a| GradeType::from(a.assignment_type))
            .unwrap_or(GradeType::Classwork),
    };

    match store::get_grade(conn, &grade.id) {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "bad_params",
                "grade already exists; use grades.update",
                Some(json!({ "gradeId": grade.id })),
            )
        }
        Ok(None) => {}
        Err(e) => return query_err(req, e),
    }

    let existing = match student_grades(conn, req, &grade.student_id, &grade.subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let target = calc::resolve_assignment(&grade, &assignments);
    if let (Some(given), Some(a)) = (grade.schedule_id.as_deref(), target) {
        if a.schedule_id != given {
            return err(
                &req.id,
                "bad_params",
                "scheduleId does not match the assignment's lesson",
                Some(json!({ "scheduleId": given, "assignmentId": a.id, "assignmentScheduleId": a.schedule_id })),
            );
        }
    }
    let taken = class.grading_system == GradingSystem::Cumulative
        && target.is_some_and(|t| {
            existing.iter().any(|g| {
                calc::resolve_assignment(g, &assignments).map(|a| a.id.as_str()) == Some(t.id.as_str())
            })
        });

    // A grade linked only by assignmentId is gated on that assignment's lesson.
    let gate_slot = grade
        .schedule_id
        .as_deref()
        .or_else(|| target.map(|a| a.schedule_id.as_str()));
    if let Some(schedule_id) = gate_slot {
        match store::get_slot(conn, schedule_id) {
            Ok(Some(slot)) => {
                let bound = BoundSlot {
                    assignments: assignments
                        .iter()
                        .filter(|a| a.schedule_id == slot.id)
                        .cloned()
                        .collect(),
                    slot,
                };
                let open = bound.slot.status == LessonStatus::Conducted
                    && (taken
                        || calc::can_grade(&bound, &grade.student_id, &existing, class.grading_system));
                if !open {
                    return err(
                        &req.id,
                        "not_gradable",
                        "this lesson cannot take a new grade for the student",
                        Some(json!({
                            "scheduleId": bound.slot.id,
                            "status": bound.slot.status,
                        })),
                    );
                }
            }
            Ok(None) => debug!(slot = schedule_id, "grade references a slot outside the working copy"),
            Err(e) => return query_err(req, e),
        }
    }

    if let (true, Some(t)) = (taken, target) {
        return err(
            &req.id,
            "already_graded",
            "the student already has a grade for this assignment",
            Some(json!({ "assignmentId": t.id, "studentId": grade.student_id })),
        );
    }

    let submission = calc::submit_grade(grade, class.grading_system, &assignments);
    if let Err(e) = store::upsert_grade(conn, &submission.accepted) {
        return insert_err(req, "grades", e);
    }
    if submission.corrected {
        info!(
            grade = %submission.accepted.id,
            submitted = submission.submitted_score,
            stored = submission.accepted.score,
            "grade score corrected"
        );
    }
    ok(&req.id, submission_json(&submission))
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut grade = match store::get_grade(conn, &grade_id) {
        Ok(Some(g)) => g,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "grade not found",
                Some(json!({ "gradeId": grade_id })),
            )
        }
        Err(e) => return query_err(req, e),
    };

    if let Some(v) = req.params.get("score").filter(|v| !v.is_null()) {
        let Some(score) = v.as_f64() else {
            return err(&req.id, "bad_params", "score must be a number", None);
        };
        if let Err(e) = check_score(req, score) {
            return e;
        }
        grade.score = score;
    }
    if let Some(v) = req.params.get("comment") {
        grade.comment = v.as_str().map(|s| s.to_string());
    }
    if let Some(t) = optional_str(req, "gradeType") {
        grade.grade_type = GradeType::from(t);
    }

    let class = match load_class(conn, req, &grade.class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignments = match subject_assignments(conn, req, &class.id, &grade.subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let submission = calc::submit_grade(grade, class.grading_system, &assignments);
    if let Err(e) = store::upsert_grade(conn, &submission.accepted) {
        return insert_err(req, "grades", e);
    }
    ok(&req.id, submission_json(&submission))
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::delete_grade(conn, &grade_id) {
        Ok(true) => ok(&req.id, json!({ "gradeId": grade_id, "deleted": true })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "grade not found",
            Some(json!({ "gradeId": grade_id })),
        ),
        Err(e) => query_err(req, e),
    }
}

/// Stored grades by student, subject, class or slot; `subgroupId` and the
/// date range narrow the result the same way averages do.
fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let filter = GradeFilter {
        student_id: optional_str(req, "studentId"),
        subject_id: optional_str(req, "subjectId"),
        class_id: optional_str(req, "classId"),
        schedule_id: optional_str(req, "scheduleId"),
    };
    let grades = match store::list_grades(conn, &filter) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    let grades: Vec<Grade> = grades
        .into_iter()
        .filter(|g| filters.range.contains(g.day()))
        .filter(|g| match filters.subgroup_id.as_deref() {
            Some(sg) => g.subgroup_id.as_deref() == Some(sg),
            None => true,
        })
        .collect();
    ok(&req.id, json!({ "grades": grades }))
}

fn handle_grades_can_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let slot = match store::get_slot(conn, &schedule_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "lesson slot not found",
                Some(json!({ "scheduleId": schedule_id })),
            )
        }
        Err(e) => return query_err(req, e),
    };
    let class = match load_class(conn, req, &slot.class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignments = match subject_assignments(conn, req, &class.id, &slot.subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let existing = match student_grades(conn, req, &student_id, &slot.subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let bound = BoundSlot {
        assignments: assignments
            .iter()
            .filter(|a| a.schedule_id == slot.id)
            .cloned()
            .collect(),
        slot,
    };
    let can_grade = calc::can_grade(&bound, &student_id, &existing, class.grading_system);
    let reason = if can_grade {
        None
    } else if bound.slot.status != LessonStatus::Conducted {
        Some("not_conducted")
    } else if bound.assignments.is_empty() {
        Some("no_assignments")
    } else {
        Some("all_assignments_graded")
    };

    ok(
        &req.id,
        json!({
            "scheduleId": bound.slot.id,
            "studentId": student_id,
            "gradingSystem": class.grading_system,
            "status": bound.slot.status,
            "canGrade": can_grade,
            "reason": reason,
        }),
    )
}

fn handle_grades_display(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match store::get_grade(conn, &grade_id) {
        Ok(Some(g)) => g,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "grade not found",
                Some(json!({ "gradeId": grade_id })),
            )
        }
        Err(e) => return query_err(req, e),
    };
    let class = match load_class(conn, req, &grade.class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignments = match subject_assignments(conn, req, &class.id, &grade.subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment = calc::resolve_assignment(&grade, &assignments);
    let display = calc::classify(class.grading_system, &grade, assignment);
    ok(
        &req.id,
        json!({
            "gradeId": grade.id,
            "gradingSystem": class.grading_system,
            "assignmentId": assignment.map(|a| a.id.as_str()),
            "display": display,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.submit" => Some(handle_grades_submit(state, req)),
        "grades.update" => Some(handle_grades_update(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        "grades.canGrade" => Some(handle_grades_can_grade(state, req)),
        "grades.display" => Some(handle_grades_display(state, req)),
        _ => None,
    }
}
