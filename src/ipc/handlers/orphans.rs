use crate::hierarchy;
use crate::ipc::error::{ok, repair_err};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::orphans;
use crate::store::Store;
use serde_json::json;

fn handle_orphans_detect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let store = Store::new(conn);
    let snapshot = match hierarchy::read_snapshot(&store, None) {
        Ok(s) => s,
        Err(e) => return repair_err(&req.id, &e),
    };

    let groups: Vec<serde_json::Value> = orphans::detect(&snapshot)
        .into_iter()
        .map(|g| {
            let counts = g.counts();
            json!({
                "collegeId": g.college_id,
                "collegeName": g.college_name,
                "danglingCampusId": g.dangling_campus_id,
                "counts": counts,
                "departmentIds": g.department_ids,
                "courseIds": g.course_ids,
                "instructorIds": g.instructor_ids,
                "studentGroupIds": g.student_group_ids,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "orphanGroups": groups,
            "integrityFindings": orphans::integrity_findings(&snapshot),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "orphans.detect" => Some(handle_orphans_detect(state, req)),
        _ => None,
    }
}
