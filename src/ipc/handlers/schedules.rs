use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, insert_err, load_class, optional_str, parse_filters, parse_params, query_err,
    required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{LessonSlot, LessonStatus};
use crate::store::{self, AssignmentFilter, GradeFilter, SlotFilter};
use serde_json::json;
use tracing::debug;

const SCHEDULES_UPSERT_MAX_SLOTS: usize = 5000;

fn handle_schedules_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slots: Vec<LessonSlot> = match parse_params(req, Some("slots")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if slots.len() > SCHEDULES_UPSERT_MAX_SLOTS {
        return err(
            &req.id,
            "bad_params",
            format!("at most {} slots per call", SCHEDULES_UPSERT_MAX_SLOTS),
            Some(json!({ "count": slots.len() })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for slot in &slots {
        if let Err(e) = store::upsert_slot(&tx, slot) {
            return insert_err(req, "lesson_slots", e);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    debug!(count = slots.len(), "lesson slots stored");
    ok(&req.id, json!({ "upserted": slots.len() }))
}

fn slot_filter(req: &Request) -> Result<SlotFilter, serde_json::Value> {
    let filters = parse_filters(req)?;
    Ok(SlotFilter {
        class_id: optional_str(req, "classId"),
        subject_id: optional_str(req, "subjectId"),
        subgroup_id: filters.subgroup_id,
        range: filters.range,
    })
}

fn handle_schedules_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let filter = match slot_filter(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    match store::list_slots(conn, &filter) {
        Ok(slots) => ok(&req.id, json!({ "slots": slots })),
        Err(e) => query_err(req, e),
    }
}

fn handle_schedules_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_status = match required_str(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(status) = LessonStatus::parse(&raw_status) else {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: not_conducted, conducted, cancelled",
            Some(json!({ "status": raw_status })),
        );
    };
    match store::set_slot_status(conn, &schedule_id, status) {
        Ok(true) => ok(&req.id, json!({ "scheduleId": schedule_id, "status": status })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "lesson slot not found",
            Some(json!({ "scheduleId": schedule_id })),
        ),
        Err(e) => query_err(req, e),
    }
}

/// Lesson slots of one subject with their assignments; with `studentId`,
/// each slot also says whether that student can be graded on it.
fn handle_lessons_with_assignments(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class = match load_class(conn, req, &class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let filter = match slot_filter(req) {
        Ok(f) => f,
        Err(e) => return e,
    };

    let schedules = match store::list_slots(conn, &filter) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    let assignments = match store::list_assignments(
        conn,
        &AssignmentFilter {
            class_id: Some(class_id.clone()),
            subject_id: Some(subject_id.clone()),
            ..AssignmentFilter::default()
        },
    ) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    let bound = calc::lesson_slots_with_assignments(&schedules, &subject_id, &assignments);

    let student_id = optional_str(req, "studentId");
    let existing = match student_id.as_deref() {
        Some(sid) => match store::list_grades(
            conn,
            &GradeFilter {
                student_id: Some(sid.to_string()),
                subject_id: Some(subject_id.clone()),
                ..GradeFilter::default()
            },
        ) {
            Ok(v) => v,
            Err(e) => return query_err(req, e),
        },
        None => Vec::new(),
    };

    let mut slots_out = Vec::with_capacity(bound.len());
    for b in &bound {
        let mut v = json!(b);
        if let Some(sid) = student_id.as_deref() {
            v["canGrade"] = json!(calc::can_grade(b, sid, &existing, class.grading_system));
        }
        slots_out.push(v);
    }

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "subjectId": subject_id,
            "gradingSystem": class.grading_system,
            "slots": slots_out,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.upsert" => Some(handle_schedules_upsert(state, req)),
        "schedules.list" => Some(handle_schedules_list(state, req)),
        "schedules.setStatus" => Some(handle_schedules_set_status(state, req)),
        "lessons.withAssignments" => Some(handle_lessons_with_assignments(state, req)),
        _ => None,
    }
}
