//! Narrow query/mutation contract over the campus hierarchy tables.
//!
//! Every mutation is a single set-based statement so SQLite's per-statement
//! atomicity applies to each step. Callers build id sets up front; nothing
//! here loops over records issuing one statement per row.

use crate::error::{RepairError, Result};
use crate::model::{
    Campus, Classroom, College, Course, Department, EntityKind, Instructor, ParentField,
    StudentGroup,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub enum Filter {
    All,
    IdIn(BTreeSet<String>),
    FieldIn(ParentField, BTreeSet<String>),
}

impl Filter {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::IdIn(ids.into_iter().map(Into::into).collect())
    }

    pub fn field<I, S>(field: ParentField, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::FieldIn(field, ids.into_iter().map(Into::into).collect())
    }

    /// An `IN ()` set can never match; callers skip the round trip.
    fn is_empty_set(&self) -> bool {
        match self {
            Filter::All => false,
            Filter::IdIn(ids) | Filter::FieldIn(_, ids) => ids.is_empty(),
        }
    }

    fn where_clause(&self, kind: EntityKind) -> Result<(String, Vec<Value>)> {
        let (column, ids) = match self {
            Filter::All => return Ok((String::new(), Vec::new())),
            Filter::IdIn(ids) => ("id", ids),
            Filter::FieldIn(field, ids) => {
                check_field(kind, *field)?;
                (field.column(), ids)
            }
        };
        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let values = ids.iter().map(|id| Value::Text(id.clone())).collect();
        Ok((format!(" WHERE {} IN ({})", column, placeholders), values))
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub field: ParentField,
    pub value: String,
}

impl Assignment {
    pub fn new(field: ParentField, value: impl Into<String>) -> Self {
        Assignment {
            field,
            value: value.into(),
        }
    }
}

fn check_field(kind: EntityKind, field: ParentField) -> Result<()> {
    if kind.parent_fields().contains(&field) {
        Ok(())
    } else {
        Err(RepairError::IntegrityViolation(format!(
            "{} has no {} column",
            kind.table(),
            field.column()
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub campus_id: String,
    pub holder: String,
    pub acquired_at: String,
}

#[derive(Clone, Copy)]
pub struct Store<'c> {
    conn: &'c Connection,
}

impl<'c> Store<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Store { conn }
    }

    fn find<T>(
        &self,
        kind: EntityKind,
        columns: &str,
        filter: &Filter,
        map: impl Fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        if filter.is_empty_set() {
            return Ok(Vec::new());
        }
        let (clause, values) = filter.where_clause(kind)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY id",
            columns,
            kind.table(),
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| map(r))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find_campuses(&self, filter: &Filter) -> Result<Vec<Campus>> {
        self.find(EntityKind::Campus, "id, name, city", filter, |r| {
            Ok(Campus {
                id: r.get(0)?,
                name: r.get(1)?,
                city: r.get(2)?,
            })
        })
    }

    pub fn find_colleges(&self, filter: &Filter) -> Result<Vec<College>> {
        self.find(EntityKind::College, "id, name, campus_id", filter, |r| {
            Ok(College {
                id: r.get(0)?,
                name: r.get(1)?,
                campus_id: r.get(2)?,
            })
        })
    }

    pub fn find_departments(&self, filter: &Filter) -> Result<Vec<Department>> {
        self.find(
            EntityKind::Department,
            "id, name, code, college_id",
            filter,
            |r| {
                Ok(Department {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    code: r.get(2)?,
                    college_id: r.get(3)?,
                })
            },
        )
    }

    pub fn find_courses(&self, filter: &Filter) -> Result<Vec<Course>> {
        self.find(
            EntityKind::Course,
            "id, name, code, course_type, year, college_id, department_id, instructor_id",
            filter,
            |r| {
                Ok(Course {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    code: r.get(2)?,
                    course_type: r.get(3)?,
                    year: r.get(4)?,
                    college_id: r.get(5)?,
                    department_id: r.get(6)?,
                    instructor_id: r.get(7)?,
                })
            },
        )
    }

    pub fn find_instructors(&self, filter: &Filter) -> Result<Vec<Instructor>> {
        self.find(
            EntityKind::Instructor,
            "id, name, department_id",
            filter,
            |r| {
                Ok(Instructor {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    department_id: r.get(2)?,
                })
            },
        )
    }

    pub fn find_student_groups(&self, filter: &Filter) -> Result<Vec<StudentGroup>> {
        self.find(
            EntityKind::StudentGroup,
            "id, name, year, department_id",
            filter,
            |r| {
                Ok(StudentGroup {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    year: r.get(2)?,
                    department_id: r.get(3)?,
                })
            },
        )
    }

    pub fn find_classrooms(&self, filter: &Filter) -> Result<Vec<Classroom>> {
        self.find(
            EntityKind::Classroom,
            "id, name, room_type, capacity, campus_id",
            filter,
            |r| {
                Ok(Classroom {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    room_type: r.get(2)?,
                    capacity: r.get(3)?,
                    campus_id: r.get(4)?,
                })
            },
        )
    }

    pub fn count(&self, kind: EntityKind, filter: &Filter) -> Result<usize> {
        if filter.is_empty_set() {
            return Ok(0);
        }
        let (clause, values) = filter.where_clause(kind)?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", kind.table(), clause);
        let n: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values), |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn bulk_update(
        &self,
        kind: EntityKind,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> Result<usize> {
        if assignments.is_empty() || filter.is_empty_set() {
            return Ok(0);
        }
        if matches!(filter, Filter::All) {
            return Err(RepairError::IntegrityViolation(format!(
                "refusing unfiltered update of {}",
                kind.table()
            )));
        }
        let mut set_parts = Vec::with_capacity(assignments.len());
        let mut values: Vec<Value> = Vec::with_capacity(assignments.len());
        for a in assignments {
            check_field(kind, a.field)?;
            set_parts.push(format!("{} = ?", a.field.column()));
            values.push(Value::Text(a.value.clone()));
        }
        let (clause, filter_values) = filter.where_clause(kind)?;
        values.extend(filter_values);

        let sql = format!(
            "UPDATE {} SET {}{}",
            kind.table(),
            set_parts.join(", "),
            clause
        );
        let updated = self.conn.execute(&sql, params_from_iter(values))?;
        tracing::debug!(table = kind.table(), updated, "bulk update");
        Ok(updated)
    }

    pub fn bulk_delete(&self, kind: EntityKind, ids: &BTreeSet<String>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let (clause, values) = Filter::IdIn(ids.clone()).where_clause(kind)?;
        let sql = format!("DELETE FROM {}{}", kind.table(), clause);
        let deleted = self.conn.execute(&sql, params_from_iter(values))?;
        tracing::debug!(table = kind.table(), deleted, "bulk delete");
        Ok(deleted)
    }

    /// Advisory lock row keyed by destination campus. Rows live in the store
    /// so a second process sees them too.
    pub fn acquire_lock(&self, campus_id: &str, holder: &str) -> Result<()> {
        let acquired_at = chrono::Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO migration_locks(campus_id, holder, acquired_at)
             VALUES(?, ?, ?)
             ON CONFLICT(campus_id) DO NOTHING",
            (campus_id, holder, &acquired_at),
        )?;
        if inserted == 1 {
            return Ok(());
        }
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT holder FROM migration_locks WHERE campus_id = ?",
                [campus_id],
                |r| r.get(0),
            )
            .optional()?;
        Err(RepairError::Locked {
            campus_id: campus_id.to_string(),
            holder: current.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Removes whatever lock row exists for `campus_id`, regardless of
    /// holder. Used by operators to recover from a run that died holding it.
    pub fn break_lock(&self, campus_id: &str) -> Result<Option<LockHolder>> {
        let current = self
            .conn
            .query_row(
                "SELECT campus_id, holder, acquired_at FROM migration_locks WHERE campus_id = ?",
                [campus_id],
                |r| {
                    Ok(LockHolder {
                        campus_id: r.get(0)?,
                        holder: r.get(1)?,
                        acquired_at: r.get(2)?,
                    })
                },
            )
            .optional()?;
        let Some(stale) = current else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM migration_locks WHERE campus_id = ? AND holder = ?",
            (&stale.campus_id, &stale.holder),
        )?;
        tracing::warn!(
            campus_id,
            holder = %stale.holder,
            acquired_at = %stale.acquired_at,
            "migration lock broken"
        );
        Ok(Some(stale))
    }

    pub fn release_lock(&self, campus_id: &str, holder: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM migration_locks WHERE campus_id = ? AND holder = ?",
            (campus_id, holder),
        )?;
        Ok(removed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO campuses(id, name, city) VALUES('A', 'Assiut', 'Assiut');
             INSERT INTO colleges(id, name, campus_id) VALUES('C1', 'IT', 'A');
             INSERT INTO colleges(id, name, campus_id) VALUES('C2', 'Business', 'A');
             INSERT INTO departments(id, name, code, college_id) VALUES('D1', 'IT', 'IT', 'C1');
             INSERT INTO departments(id, name, code, college_id) VALUES('D2', 'BUS', 'BUS', 'C2');
             INSERT INTO instructors(id, name, department_id) VALUES('I1', 'A', 'D1');
             INSERT INTO instructors(id, name, department_id) VALUES('I2', 'B', 'D1');
             INSERT INTO instructors(id, name, department_id) VALUES('I3', 'C', 'D2');",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn find_by_parent_and_by_id() {
        let conn = seeded();
        let store = Store::new(&conn);

        let in_d1 = store
            .find_instructors(&Filter::field(ParentField::DepartmentId, ["D1"]))
            .expect("find");
        assert_eq!(
            in_d1.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["I1", "I2"]
        );

        let by_id = store
            .find_colleges(&Filter::ids(["C2", "missing"]))
            .expect("find");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].name, "Business");

        assert!(store
            .find_departments(&Filter::IdIn(BTreeSet::new()))
            .expect("empty")
            .is_empty());
    }

    #[test]
    fn bulk_update_reports_matched_rows_and_is_noop_on_rerun() {
        let conn = seeded();
        let store = Store::new(&conn);
        let filter = Filter::field(ParentField::DepartmentId, ["D1"]);
        let moved = store
            .bulk_update(
                EntityKind::Instructor,
                &filter,
                &[Assignment::new(ParentField::DepartmentId, "D2")],
            )
            .expect("update");
        assert_eq!(moved, 2);
        let again = store
            .bulk_update(
                EntityKind::Instructor,
                &filter,
                &[Assignment::new(ParentField::DepartmentId, "D2")],
            )
            .expect("rerun");
        assert_eq!(again, 0);
        assert_eq!(
            store
                .count(
                    EntityKind::Instructor,
                    &Filter::field(ParentField::DepartmentId, ["D2"])
                )
                .expect("count"),
            3
        );
    }

    #[test]
    fn rejects_columns_the_kind_does_not_have() {
        let conn = seeded();
        let store = Store::new(&conn);
        let err = store
            .bulk_update(
                EntityKind::Instructor,
                &Filter::ids(["I1"]),
                &[Assignment::new(ParentField::CollegeId, "C1")],
            )
            .expect_err("instructors have no college_id");
        assert_eq!(err.code(), "integrity_violation");
    }

    #[test]
    fn lock_is_exclusive_per_campus() {
        let conn = seeded();
        let store = Store::new(&conn);
        store.acquire_lock("A", "run-1").expect("first holder");
        let err = store.acquire_lock("A", "run-2").expect_err("held");
        match err {
            RepairError::Locked { holder, .. } => assert_eq!(holder, "run-1"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!store.release_lock("A", "run-2").expect("release by non-holder"));
        assert!(store.release_lock("A", "run-1").expect("release"));
        store.acquire_lock("A", "run-2").expect("reacquire");
    }

    #[test]
    fn break_lock_clears_any_holder_and_reports_it() {
        let conn = seeded();
        let store = Store::new(&conn);
        assert_eq!(store.break_lock("A").expect("no lock"), None);

        store.acquire_lock("A", "killed-run").expect("stale holder");
        let stale = store.break_lock("A").expect("break").expect("was held");
        assert_eq!(stale.holder, "killed-run");
        assert!(!stale.acquired_at.is_empty());

        store.acquire_lock("A", "next-run").expect("free again");
        assert!(!store.release_lock("A", "killed-run").expect("stale release"));
    }

    #[test]
    fn bulk_delete_counts_only_existing_rows() {
        let conn = seeded();
        let store = Store::new(&conn);
        store
            .bulk_update(
                EntityKind::Instructor,
                &Filter::field(ParentField::DepartmentId, ["D2"]),
                &[Assignment::new(ParentField::DepartmentId, "D1")],
            )
            .expect("drain D2");
        let ids: BTreeSet<String> = ["D2".to_string(), "gone".to_string()].into();
        assert_eq!(
            store.bulk_delete(EntityKind::Department, &ids).expect("delete"),
            1
        );
        assert_eq!(
            store.bulk_delete(EntityKind::Department, &ids).expect("rerun"),
            0
        );
    }
}
