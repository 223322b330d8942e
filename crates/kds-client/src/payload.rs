//! Business-payload classification.
//!
//! The upstream reports success inside the JSON body, not via HTTP status:
//! `response_code` (top level) or `api_response.response_code` must be the
//! literal `"1"`. Numeric codes are compared by their string form.

use serde_json::{Map, Value};

pub const SUCCESS_CODE: &str = "1";

/// Business response code, if the payload carries one.
pub fn business_code(payload: &Value) -> Option<String> {
    let top = payload.get("response_code").and_then(scalar_string);
    top.or_else(|| {
        payload
            .pointer("/api_response/response_code")
            .and_then(scalar_string)
    })
}

pub fn is_success_payload(payload: &Value) -> bool {
    business_code(payload).as_deref() == Some(SUCCESS_CODE)
}

/// Best-effort human message: `response_msg`, then `api_response.response_msg`.
pub fn response_message(payload: &Value) -> Option<String> {
    payload
        .get("response_msg")
        .and_then(scalar_string)
        .or_else(|| {
            payload
                .pointer("/api_response/response_msg")
                .and_then(scalar_string)
        })
}

/// Parse a response body. Never fails: empty, invalid, or non-object JSON
/// degrades to `{}`.
pub fn parse_body(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(v @ Value::Object(_)) => v,
        _ => Value::Object(Map::new()),
    }
}

/// Non-empty string form of a JSON scalar.
fn scalar_string(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}
