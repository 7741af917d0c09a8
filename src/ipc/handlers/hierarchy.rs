use crate::hierarchy;
use crate::ipc::error::{err, ok, repair_err};
use crate::ipc::helpers::{db_conn, optional_str};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;

fn handle_campuses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "campuses": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.city,
           (SELECT COUNT(*) FROM colleges col WHERE col.campus_id = c.id) AS college_count,
           (SELECT COUNT(*) FROM classrooms r WHERE r.campus_id = c.id) AS classroom_count
         FROM campuses c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let city: Option<String> = row.get(2)?;
            let college_count: i64 = row.get(3)?;
            let classroom_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "city": city,
                "collegeCount": college_count,
                "classroomCount": classroom_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(campuses) => ok(&req.id, json!({ "campuses": campuses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_hierarchy_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let campus_id = optional_str(req, "campusId");
    let store = Store::new(conn);

    match hierarchy::read_snapshot(&store, campus_id.as_deref()) {
        Ok(snapshot) => match serde_json::to_value(&snapshot) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => repair_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "campuses.list" => Some(handle_campuses_list(state, req)),
        "hierarchy.snapshot" => Some(handle_hierarchy_snapshot(state, req)),
        _ => None,
    }
}
