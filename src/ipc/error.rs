use crate::error::RepairError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps a domain error onto the wire shape. Partial migration progress and
/// lock holders travel in `details` so the caller can decide how to resume.
pub fn repair_err(id: &str, e: &RepairError) -> serde_json::Value {
    let details = match e {
        RepairError::NotFound { kind, id } => {
            Some(json!({ "kind": kind.to_string(), "id": id }))
        }
        RepairError::Locked { campus_id, holder } => {
            Some(json!({ "campusId": campus_id, "holder": holder }))
        }
        RepairError::MigrationFailed {
            step,
            progress,
            source,
        } => Some(json!({
            "step": step,
            "lastCompletedStep": progress.last_completed(),
            "progress": progress,
            "cause": source.code(),
        })),
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}
