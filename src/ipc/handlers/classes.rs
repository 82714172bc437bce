use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, insert_err, load_class, optional_str, query_err, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassConfig, GradingSystem};
use crate::store;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };
    match store::list_classes(conn) {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => query_err(req, e),
    }
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_class(conn, req, &class_id) {
        Ok(class) => ok(&req.id, json!({ "class": class })),
        Err(e) => e,
    }
}

/// Registers (or replaces) a class's grading configuration in the working
/// copy. The school API owns this attribute; the engine only reads it.
fn handle_classes_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let raw_system = match required_str(req, "gradingSystem") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(grading_system) = GradingSystem::parse(&raw_system) else {
        return err(
            &req.id,
            "bad_params",
            "gradingSystem must be FIVE_POINT or CUMULATIVE",
            Some(json!({ "gradingSystem": raw_system })),
        );
    };

    let class = ClassConfig {
        id: optional_str(req, "classId").unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: optional_str(req, "name").unwrap_or_default(),
        grading_system,
    };
    if let Err(e) = store::upsert_class(conn, &class) {
        return insert_err(req, "classes", e);
    }
    info!(class = %class.id, system = class.grading_system.as_str(), "class registered");
    ok(&req.id, json!({ "classId": class.id, "class": class }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.upsert" => Some(handle_classes_upsert(state, req)),
        _ => None,
    }
}
