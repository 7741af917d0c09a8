mod test_support;

use serde_json::json;
use test_support::{
    assiut_plan, count, open_workspace_db, request_err, request_ok, seeded_workspace,
    spawn_sidecar, ASSIUT_SEED,
};

#[test]
fn assiut_it_orphans_merge_into_populated_destination() {
    let workspace = seeded_workspace("campusd-consolidate-ipc", ASSIUT_SEED);
    {
        let conn = open_workspace_db(&workspace);
        conn.execute_batch(
            "INSERT INTO courses(id, name, code, college_id, department_id) VALUES('N1', 'Intro to IT', 'IT001', 'NEW', 'NEWD');
             INSERT INTO instructors(id, name, department_id) VALUES('NI1', 'Dr. Nour', 'NEWD');
             INSERT INTO student_groups(id, name, year, department_id) VALUES('NG', 'IT-0', 1, 'NEWD');",
        )
        .expect("existing destination rows");
    }
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "readiness.evaluate",
        json!({ "campusId": "A" }),
    );
    let before = &before["readiness"];
    assert_eq!(before["generationFeasible"], true);
    assert_eq!(before["courseCount"], 1);
    assert_eq!(before["instructorCount"], 1);
    assert_eq!(before["studentGroupCount"], 1);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "consolidation.preview",
        json!({ "plan": assiut_plan() }),
    );
    let rule = &preview["rules"][0];
    assert_eq!(rule["courses"], 6);
    assert_eq!(rule["instructors"], 4);
    assert_eq!(rule["studentGroups"], 2);
    assert_eq!(rule["departments"], 2);
    assert_eq!(rule["collegesToDelete"], json!(["X", "Y"]));

    {
        let conn = open_workspace_db(&workspace);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM colleges"), 3);
    }

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "consolidation.apply",
        json!({ "plan": assiut_plan() }),
    );
    assert_eq!(applied["generationFeasible"], true);
    let readiness = &applied["readiness"][0];
    assert_eq!(readiness["courseCount"], 1 + 6);
    assert_eq!(readiness["instructorCount"], 1 + 4);
    assert_eq!(readiness["studentGroupCount"], 1 + 2);
    assert_eq!(readiness["coursesByCollege"]["IT-new"], 7);

    let health = request_ok(&mut stdin, &mut reader, "4b", "health", json!({}));
    assert_eq!(health["lastRunId"], applied["runId"]);

    {
        let conn = open_workspace_db(&workspace);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM colleges WHERE id IN ('X', 'Y')"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM departments WHERE id IN ('XD', 'YD')"), 0);
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM courses WHERE college_id = 'NEW' AND department_id = 'NEWD'"
            ),
            7
        );
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM instructors WHERE department_id = 'NEWD'"), 5);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM student_groups WHERE department_id = 'NEWD'"), 3);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM migration_locks"), 0);
    }

    let orphans = request_ok(&mut stdin, &mut reader, "5", "orphans.detect", json!({}));
    assert_eq!(orphans["orphanGroups"].as_array().map(|v| v.len()), Some(0));

    // Sources are gone now; a repeat run touches nothing.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "consolidation.apply",
        json!({ "plan": assiut_plan() }),
    );
    let steps = again["progress"]["completed"].as_array().expect("steps");
    for s in steps {
        if s["step"] != "verifyReadiness" {
            assert_eq!(s["count"], 0, "step {}", s["step"]);
        }
    }
    assert_eq!(again["readiness"][0]["courseCount"], 7);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn blocked_step_surfaces_progress_then_resume_completes() {
    let workspace = seeded_workspace("campusd-consolidate-resume", ASSIUT_SEED);
    {
        let conn = open_workspace_db(&workspace);
        conn.execute_batch(
            "CREATE TRIGGER freeze_groups BEFORE UPDATE ON student_groups
             BEGIN SELECT RAISE(ABORT, 'student groups frozen'); END;",
        )
        .expect("trigger");
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let failed = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "consolidation.apply",
        json!({ "plan": assiut_plan() }),
    );
    assert_eq!(failed["code"], "migration_failed");
    assert_eq!(failed["details"]["step"], "moveStudentGroups");
    assert_eq!(failed["details"]["lastCompletedStep"], "moveInstructors");
    assert_eq!(failed["details"]["cause"], "db_query_failed");

    {
        let conn = open_workspace_db(&workspace);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM courses WHERE college_id = 'NEW'"), 6);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM colleges WHERE id IN ('X', 'Y')"), 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM migration_locks"), 0);
        conn.execute_batch("DROP TRIGGER freeze_groups")
            .expect("drop trigger");
    }

    let resumed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "consolidation.apply",
        json!({ "plan": assiut_plan() }),
    );
    assert_eq!(resumed["generationFeasible"], true);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn plan_errors_map_to_stable_codes() {
    let workspace = seeded_workspace("campusd-consolidate-errors", ASSIUT_SEED);
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let missing = request_err(&mut stdin, &mut reader, "2", "consolidation.apply", json!({}));
    assert_eq!(missing["code"], "bad_params");

    let malformed = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "consolidation.preview",
        json!({ "plan": { "rules": "IT" } }),
    );
    assert_eq!(malformed["code"], "bad_params");

    let mut wrong_dest = assiut_plan();
    wrong_dest["rules"][0]["destination"]["departmentId"] = json!("nope");
    let not_found = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "consolidation.apply",
        json!({ "plan": wrong_dest }),
    );
    assert_eq!(not_found["code"], "not_found");
    assert_eq!(not_found["details"]["kind"], "department");

    {
        let conn = open_workspace_db(&workspace);
        conn.execute(
            "INSERT INTO migration_locks(campus_id, holder, acquired_at) VALUES('A', 'someone-else', '2026-01-01T00:00:00Z')",
            [],
        )
        .expect("foreign lock");
    }
    let locked = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "consolidation.apply",
        json!({ "plan": assiut_plan() }),
    );
    assert_eq!(locked["code"], "locked");
    assert_eq!(locked["details"]["holder"], "someone-else");

    {
        let conn = open_workspace_db(&workspace);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM colleges WHERE id IN ('X', 'Y')"), 2);
    }

    let unlocked = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "consolidation.unlock",
        json!({ "campusId": "A" }),
    );
    assert_eq!(unlocked["released"], true);
    assert_eq!(unlocked["staleLock"]["holder"], "someone-else");
    assert_eq!(unlocked["staleLock"]["acquiredAt"], "2026-01-01T00:00:00Z");

    let resumed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "consolidation.apply",
        json!({ "plan": assiut_plan() }),
    );
    assert_eq!(resumed["generationFeasible"], true);

    let nothing = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "consolidation.unlock",
        json!({ "campusId": "A" }),
    );
    assert_eq!(nothing["released"], false);
    assert!(nothing["staleLock"].is_null());

    let _ = std::fs::remove_dir_all(workspace);
}
