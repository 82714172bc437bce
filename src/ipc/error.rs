use crate::calc::CalcError;
use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    failure(
        id,
        CalcError {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    )
}

/// `{id, ok: false, error: {code, message, details?}}`
pub fn failure(id: &str, error: CalcError) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}
