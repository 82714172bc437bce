use crate::calc::{self, resolve, AverageFilters, AverageKey, FivePointSettings, RemoteAverages};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_conn, five_point_settings, load_class, parse_filters, query_err, remote_client, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Assignment, ClassConfig, Grade};
use crate::remote::HttpRemoteAverages;
use crate::store::{self, AssignmentFilter, GradeFilter};
use rusqlite::Connection;
use serde_json::json;
use tracing::warn;

/// Everything one class/subject aggregate reads.
struct SubjectRecords {
    class: ClassConfig,
    subject_id: String,
    grades: Vec<Grade>,
    assignments: Vec<Assignment>,
}

fn load_records(
    conn: &Connection,
    req: &Request,
    class: ClassConfig,
    subject_id: &str,
    student_id: Option<&str>,
) -> Result<SubjectRecords, serde_json::Value> {
    let grades = store::list_grades(
        conn,
        &GradeFilter {
            student_id: student_id.map(|s| s.to_string()),
            subject_id: Some(subject_id.to_string()),
            class_id: Some(class.id.clone()),
            ..GradeFilter::default()
        },
    )
    .map_err(|e| query_err(req, e))?;
    let assignments = store::list_assignments(
        conn,
        &AssignmentFilter {
            class_id: Some(class.id.clone()),
            subject_id: Some(subject_id.to_string()),
            ..AssignmentFilter::default()
        },
    )
    .map_err(|e| query_err(req, e))?;
    Ok(SubjectRecords {
        class,
        subject_id: subject_id.to_string(),
        grades,
        assignments,
    })
}

fn average_key(student_id: &str, subject_id: &str, filters: &AverageFilters) -> AverageKey {
    AverageKey {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        subgroup_id: filters.subgroup_id.clone(),
        range: filters.range,
    }
}

fn as_remote(client: &Option<HttpRemoteAverages>) -> Option<&dyn RemoteAverages> {
    client.as_ref().map(|c| c as &dyn RemoteAverages)
}

/// One resolved average with its identifying fields. Local results also say
/// how many grades went in and how many had no resolvable ceiling.
fn average_row(
    remote: Option<&dyn RemoteAverages>,
    key: &AverageKey,
    records: &SubjectRecords,
    five_point: &FivePointSettings,
) -> serde_json::Value {
    let system = records.class.grading_system;
    let (resolved, local) = calc::subject_average(
        remote,
        key,
        system,
        &records.grades,
        &records.assignments,
        five_point,
    );
    let mut row = json!({
        "studentId": key.student_id,
        "subjectId": key.subject_id,
        "classId": records.class.id,
        "subgroupId": key.subgroup_id,
        "gradingSystem": system,
        "average": resolved.value.average,
        "percentage": resolved.value.percentage,
        "maxScore": resolved.value.max_score,
        "source": resolved.source,
    });
    if let Some(local) = local {
        row["counted"] = json!(local.counted);
        row["excluded"] = json!(local.excluded);
    }
    row
}

fn handle_averages_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let class = match load_class(conn, req, &class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let five_point = match five_point_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match load_records(conn, req, class, &subject_id, Some(&student_id)) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let client = remote_client(state);
    let key = average_key(&student_id, &subject_id, &filters);
    ok(&req.id, average_row(as_remote(&client), &key, &records, &five_point))
}

/// Student view: every subject the student holds grades in.
fn handle_averages_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let five_point = match five_point_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let pairs = match store::subjects_for_student(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };

    let client = remote_client(state);
    let mut subjects = Vec::with_capacity(pairs.len());
    for (subject_id, class_id) in pairs {
        let class = match store::get_class(conn, &class_id) {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(class = %class_id, subject = %subject_id, "grades reference an unregistered class");
                continue;
            }
            Err(e) => return query_err(req, e),
        };
        let records = match load_records(conn, req, class, &subject_id, Some(&student_id)) {
            Ok(r) => r,
            Err(e) => return e,
        };
        let key = average_key(&student_id, &records.subject_id, &filters);
        subjects.push(average_row(as_remote(&client), &key, &records, &five_point));
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "subjects": subjects }),
    )
}

/// Class view: every graded student of a class in one subject.
fn handle_averages_class(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let class = match load_class(conn, req, &class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let five_point = match five_point_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let students = match store::students_for_class_subject(conn, &class_id, &subject_id) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    let records = match load_records(conn, req, class, &subject_id, None) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let client = remote_client(state);
    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|sid| {
            let key = average_key(sid, &subject_id, &filters);
            average_row(as_remote(&client), &key, &records, &five_point)
        })
        .collect();

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "subjectId": subject_id,
            "gradingSystem": records.class.grading_system,
            "students": rows,
        }),
    )
}

/// Runs the remote lookup and the local computation side by side.
fn handle_averages_compare(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let class = match load_class(conn, req, &class_id) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let five_point = match five_point_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match load_records(conn, req, class, &subject_id, Some(&student_id)) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let key = average_key(&student_id, &subject_id, &filters);
    let local = calc::local_aggregate(
        &key,
        records.class.grading_system,
        &records.grades,
        &records.assignments,
        &five_point,
    );
    let local_avg = local.to_subject_average();

    let Some(client) = remote_client(state) else {
        return ok(
            &req.id,
            json!({
                "local": local_avg,
                "remote": null,
                "agree": null,
                "remoteError": resolve::RemoteUnavailable::NotConfigured.to_string(),
            }),
        );
    };
    match client.fetch(&key).and_then(resolve::validate_remote) {
        Ok(remote_avg) => {
            let agree = calc::averages_agree(&remote_avg, &local_avg);
            if !agree {
                warn!(
                    student = %student_id,
                    subject = %subject_id,
                    remote = %remote_avg.average,
                    local = %local_avg.average,
                    "remote and local averages disagree"
                );
            }
            ok(
                &req.id,
                json!({ "local": local_avg, "remote": remote_avg, "agree": agree }),
            )
        }
        Err(e) => ok(
            &req.id,
            json!({
                "local": local_avg,
                "remote": null,
                "agree": null,
                "remoteError": e.to_string(),
            }),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "averages.subject" => Some(handle_averages_subject(state, req)),
        "averages.student" => Some(handle_averages_student(state, req)),
        "averages.class" => Some(handle_averages_class(state, req)),
        "averages.compare" => Some(handle_averages_compare(state, req)),
        _ => None,
    }
}
