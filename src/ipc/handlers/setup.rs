use crate::calc::FivePointSettings;
use crate::config::{self, RemoteAveragesSetting, SETTINGS_FIVE_POINT, SETTINGS_REMOTE_AVERAGES};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, five_point_settings, query_err};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

fn settings_snapshot(state: &AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let five_point = match five_point_settings(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let remote_override = match db::settings_get_json(conn, SETTINGS_REMOTE_AVERAGES) {
        Ok(v) => v,
        Err(e) => return query_err(req, e),
    };
    ok(
        &req.id,
        json!({
            "fivePoint": five_point,
            "remoteAverages": {
                "effective": config::effective_remote(&state.config, Some(conn)),
                "environment": state.config.remote_averages,
                "override": remote_override,
            }
        }),
    )
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> Value {
    settings_snapshot(state, req)
}

fn validate_five_point(req: &Request, raw: &Value) -> Result<FivePointSettings, Value> {
    let parsed: FivePointSettings = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            e.to_string(),
            Some(json!({ "param": "fivePoint" })),
        )
    })?;
    if let Some((label, w)) = parsed.weights.iter().find(|(_, w)| !w.is_finite()) {
        return Err(err(
            &req.id,
            "bad_params",
            "weights must be finite numbers",
            Some(json!({ "gradeType": label, "weight": w.to_string() })),
        ));
    }
    Ok(parsed)
}

fn validate_remote(req: &Request, raw: &Value) -> Result<RemoteAveragesSetting, Value> {
    let parsed: RemoteAveragesSetting = serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            e.to_string(),
            Some(json!({ "param": "remoteAverages" })),
        )
    })?;
    if let Some(url) = parsed.base_url.as_deref() {
        let url = url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(err(
                &req.id,
                "bad_params",
                "baseUrl must start with http:// or https://",
                Some(json!({ "baseUrl": url })),
            ));
        }
    }
    if parsed.timeout_ms == Some(0) {
        return Err(err(&req.id, "bad_params", "timeoutMs must be positive", None));
    }
    Ok(parsed)
}

/// Updates the sections present in params. `remoteAverages: null` drops the
/// workspace override so the environment applies again.
fn handle_settings_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    if let Some(raw) = req.params.get("fivePoint") {
        let res = if raw.is_null() {
            db::settings_delete(conn, SETTINGS_FIVE_POINT)
        } else {
            let parsed = match validate_five_point(req, raw) {
                Ok(v) => v,
                Err(e) => return e,
            };
            db::settings_set_json(conn, SETTINGS_FIVE_POINT, &json!(parsed))
        };
        if let Err(e) = res {
            return err(&req.id, "db_update_failed", format!("{e:#}"), None);
        }
    }

    if let Some(raw) = req.params.get("remoteAverages") {
        let res = if raw.is_null() {
            db::settings_delete(conn, SETTINGS_REMOTE_AVERAGES)
        } else {
            let parsed = match validate_remote(req, raw) {
                Ok(v) => v,
                Err(e) => return e,
            };
            db::settings_set_json(conn, SETTINGS_REMOTE_AVERAGES, &json!(parsed))
        };
        if let Err(e) = res {
            return err(&req.id, "db_update_failed", format!("{e:#}"), None);
        }
        info!(
            remote = ?config::effective_remote(&state.config, Some(conn)).map(|r| r.base_url),
            "averaging endpoint updated"
        );
    }

    settings_snapshot(state, req)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
