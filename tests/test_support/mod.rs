#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

pub fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_campusd"))
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("run campusd")
}

/// Lets the binary create the schema, then seeds rows directly.
pub fn seeded_workspace(prefix: &str, seed_sql: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "init",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        drop(stdin);
        let _ = child.wait();
    }
    let conn = open_workspace_db(&workspace);
    conn.execute_batch(seed_sql).expect("seed workspace");
    workspace
}

pub fn open_workspace_db(workspace: &Path) -> Connection {
    let conn = Connection::open(workspace.join(DB_FILE_NAME)).expect("open workspace db");
    conn.execute("PRAGMA foreign_keys = ON", [])
        .expect("enable foreign keys");
    conn
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).expect("count query")
}

/// Destination campus A with an empty IT college/department and one room,
/// plus two orphaned IT colleges: X with a null campus and Y pointing at a
/// campus that was deleted. Each orphan holds 3 courses, 2 instructors and
/// 1 student group.
pub const ASSIUT_SEED: &str = "
    INSERT INTO campuses(id, name, city) VALUES('A', 'Assiut', 'Assiut');
    INSERT INTO campuses(id, name, city) VALUES('S', 'Sohag', 'Sohag');
    INSERT INTO colleges(id, name, campus_id) VALUES('NEW', 'IT-new', 'A');
    INSERT INTO departments(id, name, code, college_id) VALUES('NEWD', 'IT-new-dept', 'IT', 'NEW');
    INSERT INTO classrooms(id, name, room_type, capacity, campus_id) VALUES('R1', 'Hall 1', 'LECTURE_HALL', 120, 'A');

    INSERT INTO colleges(id, name, campus_id) VALUES('X', 'IT-old', NULL);
    INSERT INTO departments(id, name, code, college_id) VALUES('XD', 'IT', 'IT', 'X');
    INSERT INTO courses(id, name, code, college_id, department_id) VALUES('X1', 'Programming 1', 'IT101', 'X', 'XD');
    INSERT INTO courses(id, name, code, college_id, department_id) VALUES('X2', 'Databases', 'IT102', 'X', 'XD');
    INSERT INTO courses(id, name, code, college_id, department_id) VALUES('X3', 'Networks', 'IT103', 'X', 'XD');
    INSERT INTO instructors(id, name, department_id) VALUES('XI1', 'Dr. Hassan', 'XD');
    INSERT INTO instructors(id, name, department_id) VALUES('XI2', 'Dr. Mona', 'XD');
    INSERT INTO student_groups(id, name, year, department_id) VALUES('XG', 'IT-1', 1, 'XD');

    INSERT INTO colleges(id, name, campus_id) VALUES('Y', 'IT-old2', 'deleted-campus');
    INSERT INTO departments(id, name, code, college_id) VALUES('YD', 'IT', 'IT', 'Y');
    INSERT INTO courses(id, name, code, college_id, department_id) VALUES('Y1', 'Algorithms', 'IT201', 'Y', 'YD');
    INSERT INTO courses(id, name, code, college_id, department_id) VALUES('Y2', 'Compilers', 'IT202', 'Y', 'YD');
    INSERT INTO courses(id, name, code, college_id, department_id) VALUES('Y3', 'Security', 'IT203', 'Y', 'YD');
    INSERT INTO instructors(id, name, department_id) VALUES('YI1', 'Dr. Ali', 'YD');
    INSERT INTO instructors(id, name, department_id) VALUES('YI2', 'Dr. Sara', 'YD');
    INSERT INTO student_groups(id, name, year, department_id) VALUES('YG', 'IT-2', 2, 'YD');
";

pub fn assiut_plan() -> serde_json::Value {
    json!({
        "rules": [{
            "label": "IT",
            "sources": ["X", "Y"],
            "destination": { "campusId": "A", "collegeId": "NEW", "departmentId": "NEWD" }
        }]
    })
}
