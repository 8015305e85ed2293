use serde_json::json;

/// Success envelope; `extra` fields (outcome details, student_id/date) are
/// merged alongside `result` and `message`.
pub fn success(message: impl Into<String>, extra: serde_json::Value) -> serde_json::Value {
    let mut resp = json!({
        "result": "success",
        "message": message.into(),
    });
    if let Some(map) = extra.as_object() {
        for (k, v) in map {
            resp[k.as_str()] = v.clone();
        }
    }
    resp
}

pub fn error_response(message: impl Into<String>) -> serde_json::Value {
    json!({
        "result": "error",
        "message": message.into(),
    })
}
