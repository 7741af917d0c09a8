use crate::hierarchy;
use crate::ipc::error::{err, ok, repair_err};
use crate::ipc::helpers::{db_conn, optional_str};
use crate::ipc::types::{AppState, Request};
use crate::readiness;
use crate::store::Store;
use serde_json::json;

/// Accepts either an exact `campusId` or a `campus` selector (id or name
/// fragment).
fn handle_readiness_evaluate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let store = Store::new(conn);

    let campus_id = match (optional_str(req, "campusId"), optional_str(req, "campus")) {
        (Some(id), _) => id,
        (None, Some(selector)) => match hierarchy::resolve_campus(&store, &selector) {
            Ok(c) => c.id,
            Err(e) => return repair_err(&req.id, &e),
        },
        (None, None) => return err(&req.id, "bad_params", "missing campusId or campus", None),
    };

    match readiness::evaluate_campus(&store, &campus_id) {
        Ok(report) => ok(&req.id, json!({ "readiness": report })),
        Err(e) => repair_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "readiness.evaluate" => Some(handle_readiness_evaluate(state, req)),
        _ => None,
    }
}
