use crate::consolidate::{self, ConsolidationPlan};
use crate::error::RepairError;
use crate::ipc::error::{err, ok, repair_err};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;
use std::path::Path;

/// The plan comes inline as `params.plan` or from a JSON file at
/// `params.planPath`.
fn parse_plan(req: &Request) -> Result<ConsolidationPlan, serde_json::Value> {
    let parsed = if let Some(v) = req.params.get("plan").filter(|v| !v.is_null()) {
        ConsolidationPlan::from_value(v)
    } else if let Some(p) = optional_str(req, "planPath") {
        ConsolidationPlan::from_path(Path::new(&p))
    } else {
        return Err(err(&req.id, "bad_params", "missing plan or planPath", None));
    };
    parsed.map_err(|e: RepairError| repair_err(&req.id, &e))
}

fn handle_consolidation_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let plan = match parse_plan(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match consolidate::preview(&Store::new(conn), &plan) {
        Ok(rules) => ok(&req.id, json!({ "rules": rules })),
        Err(e) => repair_err(&req.id, &e),
    }
}

fn handle_consolidation_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let plan = match parse_plan(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let result = consolidate::apply(&Store::new(conn), &plan);
    match result {
        Ok(outcome) => {
            state.last_run_id = Some(outcome.run_id.clone());
            ok(
                &req.id,
                json!({
                    "runId": outcome.run_id,
                    "progress": outcome.progress,
                    "readiness": outcome.readiness,
                    "generationFeasible": outcome.all_feasible(),
                }),
            )
        }
        Err(e) => repair_err(&req.id, &e),
    }
}

/// Clears the migration lock on a campus left behind by a run that died
/// before releasing it.
fn handle_consolidation_unlock(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let campus_id = match required_str(req, "campusId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match Store::new(conn).break_lock(&campus_id) {
        Ok(stale) => ok(
            &req.id,
            json!({
                "campusId": campus_id,
                "released": stale.is_some(),
                "staleLock": stale,
            }),
        ),
        Err(e) => repair_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "consolidation.preview" => Some(handle_consolidation_preview(state, req)),
        "consolidation.apply" => Some(handle_consolidation_apply(state, req)),
        "consolidation.unlock" => Some(handle_consolidation_unlock(state, req)),
        _ => None,
    }
}
