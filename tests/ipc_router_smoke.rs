mod test_support;

use serde_json::json;
use test_support::{request, request_ok, seed_class, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("remoteAverages").map(|v| v.is_null()).unwrap_or(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_class(&mut stdin, &mut reader, "c1", "CUMULATIVE", "math", 2);

    let calls = [
        ("classes.list", json!({})),
        ("classes.get", json!({ "classId": "c1" })),
        ("schedules.list", json!({ "classId": "c1" })),
        ("schedules.setStatus", json!({ "scheduleId": "L2", "status": "cancelled" })),
        ("lessons.withAssignments", json!({ "classId": "c1", "subjectId": "math" })),
        (
            "assignments.create",
            json!({
                "id": "A1",
                "scheduleId": "L1",
                "teacherId": "t1",
                "assignmentType": "control_work",
                "maxScore": "5"
            }),
        ),
        ("assignments.update", json!({ "assignmentId": "A1", "description": "quiz" })),
        ("assignments.list", json!({ "classId": "c1" })),
        (
            "grades.submit",
            json!({
                "id": "G1",
                "studentId": "S",
                "subjectId": "math",
                "classId": "c1",
                "teacherId": "t1",
                "score": 4,
                "scheduleId": "L1",
                "assignmentId": "A1"
            }),
        ),
        ("grades.update", json!({ "gradeId": "G1", "comment": "ok" })),
        ("grades.list", json!({ "studentId": "S" })),
        ("grades.canGrade", json!({ "scheduleId": "L1", "studentId": "S" })),
        ("grades.display", json!({ "gradeId": "G1" })),
        ("averages.subject", json!({ "studentId": "S", "subjectId": "math", "classId": "c1" })),
        ("averages.student", json!({ "studentId": "S" })),
        ("averages.class", json!({ "classId": "c1", "subjectId": "math" })),
        ("averages.compare", json!({ "studentId": "S", "subjectId": "math", "classId": "c1" })),
        ("settings.get", json!({})),
        ("settings.update", json!({ "fivePoint": { "method": "weighted" } })),
        ("grades.delete", json!({ "gradeId": "G1" })),
        ("assignments.delete", json!({ "assignmentId": "A1" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("r{}", i), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "x", "grades.explode", json!({}));
    assert_eq!(
        unknown.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );
}

#[test]
fn requests_before_workspace_select_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "averages.subject",
        json!({ "studentId": "S", "subjectId": "math", "classId": "c1" }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );
    let listed = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert_eq!(listed["classes"], json!([]));
}
