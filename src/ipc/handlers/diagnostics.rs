use crate::diagnostics::{self, DEFAULT_REPORT_FILE};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;
use std::path::PathBuf;

fn handle_diagnostics_write(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let out_path = match (optional_str(req, "outPath"), state.workspace.as_ref()) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(ws)) => ws.join(DEFAULT_REPORT_FILE),
        (None, None) => return err(&req.id, "no_workspace", "select a workspace first", None),
    };

    let report = diagnostics::build_report(&Store::new(conn), optional_str(req, "campus").as_deref());
    if let Err(e) = diagnostics::write_report(&report, &out_path) {
        return err(
            &req.id,
            "write_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path.to_string_lossy() })),
        );
    }

    ok(
        &req.id,
        json!({
            "path": out_path.to_string_lossy(),
            "orphanGroupCount": report.orphan_groups.len(),
            "integrityFindingCount": report.integrity_findings.len(),
            "target": report.target,
            "warnings": report.warnings,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "diagnostics.write" => Some(handle_diagnostics_write(state, req)),
        _ => None,
    }
}
