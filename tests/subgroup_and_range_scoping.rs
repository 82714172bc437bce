mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

fn avg(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    extra: serde_json::Value,
) -> serde_json::Value {
    let mut params = json!({ "studentId": "S", "subjectId": "eng", "classId": "c1" });
    if let Some(obj) = extra.as_object() {
        for (k, v) in obj {
            params[k.as_str()] = v.clone();
        }
    }
    request_ok(stdin, reader, id, "averages.subject", params)
}

#[test]
fn averages_are_scoped_to_subgroup_and_date_range() {
    let workspace = temp_dir("gradebook-scoping");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.upsert",
        json!({ "classId": "c1", "gradingSystem": "FIVE_POINT" }),
    );

    let grades = [
        ("G1", 5.0, None, "2024-09-02T09:00:00Z"),
        ("G2", 3.0, None, "2024-10-02T09:00:00Z"),
        ("G3", 2.0, Some("g1"), "2024-09-03T09:00:00Z"),
        ("G4", 4.0, Some("g2"), "2024-09-04T09:00:00Z"),
    ];
    for (id, score, subgroup, at) in grades {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "grades.submit",
            json!({
                "id": id,
                "studentId": "S",
                "subjectId": "eng",
                "classId": "c1",
                "teacherId": "t1",
                "score": score,
                "gradeType": "classwork",
                "subgroupId": subgroup,
                "createdAt": at
            }),
        );
    }

    let unscoped = avg(&mut stdin, &mut reader, "a1", json!({}));
    assert_eq!(unscoped["average"], json!("4.0"));
    assert_eq!(unscoped["counted"], json!(2));

    let all = avg(&mut stdin, &mut reader, "a2", json!({ "subgroupId": "ALL" }));
    assert_eq!(all["average"], json!("4.0"));

    let g1 = avg(&mut stdin, &mut reader, "a3", json!({ "subgroupId": "g1" }));
    assert_eq!(g1["average"], json!("2.0"));
    assert_eq!(g1["subgroupId"], json!("g1"));

    let empty = avg(&mut stdin, &mut reader, "a4", json!({ "subgroupId": "g9" }));
    assert_eq!(empty["average"], json!("-"));

    let september = avg(
        &mut stdin,
        &mut reader,
        "a5",
        json!({ "fromDate": "2024-09-01", "toDate": "2024-09-30" }),
    );
    assert_eq!(september["average"], json!("5.0"));

    let october = avg(&mut stdin, &mut reader, "a6", json!({ "fromDate": "2024-10-01" }));
    assert_eq!(october["average"], json!("3.0"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "l",
        "grades.list",
        json!({ "studentId": "S", "subgroupId": "g2" }),
    );
    assert_eq!(listed["grades"].as_array().map(|v| v.len()), Some(1));
    assert_eq!(listed["grades"][0]["id"], json!("G4"));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "bad",
            "averages.subject",
            json!({
                "studentId": "S",
                "subjectId": "eng",
                "classId": "c1",
                "fromDate": "2024-10-01",
                "toDate": "2024-09-01"
            }),
        ),
        "bad_params"
    );
}
