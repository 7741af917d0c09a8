use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS campuses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            city TEXT
        )",
        [],
    )?;

    // No foreign key on campus_id: colleges may outlive their campus, and the
    // repair tooling has to be able to see those rows.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS colleges(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            campus_id TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_colleges_campus ON colleges(campus_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            college_id TEXT NOT NULL,
            FOREIGN KEY(college_id) REFERENCES colleges(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_departments_college ON departments(college_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS instructors(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_instructors_department ON instructors(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            course_type TEXT NOT NULL DEFAULT 'THEORETICAL',
            year INTEGER,
            college_id TEXT NOT NULL,
            department_id TEXT NOT NULL,
            FOREIGN KEY(college_id) REFERENCES colleges(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    ensure_courses_instructor_id(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_college ON courses(college_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            department_id TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_groups_department ON student_groups(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            room_type TEXT NOT NULL DEFAULT 'LECTURE_HALL',
            capacity INTEGER,
            campus_id TEXT NOT NULL,
            FOREIGN KEY(campus_id) REFERENCES campuses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classrooms_campus ON classrooms(campus_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS migration_locks(
            campus_id TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

// Workspaces created before courses tracked a lead instructor lack the column.
fn ensure_courses_instructor_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "instructor_id")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE courses ADD COLUMN instructor_id TEXT REFERENCES instructors(id)",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
