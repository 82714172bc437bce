use crate::calc::{self, CalcError};
use crate::config;
use crate::ipc::error::{err, failure};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassConfig;
use crate::remote::HttpRemoteAverages;
use crate::store;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    failure(&req.id, e)
}

pub fn query_err(req: &Request, e: anyhow::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", format!("{e:#}"), None)
}

pub fn insert_err(req: &Request, table: &str, e: anyhow::Error) -> serde_json::Value {
    err(
        &req.id,
        "db_insert_failed",
        format!("{e:#}"),
        Some(json!({ "table": table })),
    )
}

/// Deserializes `params[key]` (or the whole params object when `key` is
/// `None`) into a typed record.
pub fn parse_params<T: DeserializeOwned>(req: &Request, key: Option<&str>) -> Result<T, serde_json::Value> {
    let raw = match key {
        Some(k) => req
            .params
            .get(k)
            .cloned()
            .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", k), None))?,
        None => req.params.clone(),
    };
    serde_json::from_value(raw).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            e.to_string(),
            key.map(|k| json!({ "param": k })),
        )
    })
}

pub fn parse_filters(req: &Request) -> Result<calc::AverageFilters, serde_json::Value> {
    calc::parse_average_filters(&req.params).map_err(|e| calc_err(req, e))
}

pub fn load_class(conn: &Connection, req: &Request, class_id: &str) -> Result<ClassConfig, serde_json::Value> {
    match store::get_class(conn, class_id) {
        Ok(Some(c)) => Ok(c),
        Ok(None) => Err(err(
            &req.id,
            "not_found",
            "class not found",
            Some(json!({ "classId": class_id })),
        )),
        Err(e) => Err(query_err(req, e)),
    }
}

pub fn five_point_settings(conn: &Connection, req: &Request) -> Result<calc::FivePointSettings, serde_json::Value> {
    config::five_point_settings(conn).map_err(|e| {
        err(
            &req.id,
            "bad_settings",
            format!("{e:#}"),
            Some(json!({ "key": config::SETTINGS_FIVE_POINT })),
        )
    })
}

/// Client for the averaging endpoint in effect, if any.
pub fn remote_client(state: &AppState) -> Option<HttpRemoteAverages> {
    config::effective_remote(&state.config, state.db.as_ref()).map(|cfg| HttpRemoteAverages::new(&cfg))
}
