use crate::error::Result;
use crate::hierarchy::{self, Snapshot};
use crate::store::Store;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

pub const UNRESOLVED_BUCKET: &str = "NULL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub campus_id: String,
    pub campus_name: Option<String>,
    pub classroom_count: usize,
    pub course_count: usize,
    pub instructor_count: usize,
    pub student_group_count: usize,
    pub courses_by_college: BTreeMap<String, usize>,
    pub instructors_by_college: BTreeMap<String, usize>,
    pub student_groups_by_college: BTreeMap<String, usize>,
    /// Existence only: every category has at least one record. Coverage and
    /// capacity are the schedule generator's concern.
    pub generation_feasible: bool,
    pub missing: Vec<String>,
}

/// Counts the campus's transitive subtree inside `snapshot`. Works on both a
/// campus-scoped and a full snapshot.
pub fn evaluate(snapshot: &Snapshot, campus_id: &str) -> ReadinessReport {
    let colleges = snapshot.college_index();
    let departments = snapshot.department_index();

    let college_ids: HashSet<&str> = snapshot
        .all_colleges
        .iter()
        .filter(|c| c.campus_id.as_deref() == Some(campus_id))
        .map(|c| c.id.as_str())
        .collect();
    let department_ids: HashSet<&str> = snapshot
        .departments
        .iter()
        .filter(|d| college_ids.contains(d.college_id.as_str()))
        .map(|d| d.id.as_str())
        .collect();

    let college_name = |college_id: &str| -> String {
        colleges
            .get(college_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| UNRESOLVED_BUCKET.to_string())
    };
    let college_name_via_department = |department_id: &str| -> String {
        departments
            .get(department_id)
            .map(|d| college_name(&d.college_id))
            .unwrap_or_else(|| UNRESOLVED_BUCKET.to_string())
    };

    let mut courses_by_college = BTreeMap::new();
    let mut course_count = 0;
    for c in &snapshot.courses {
        if college_ids.contains(c.college_id.as_str())
            || department_ids.contains(c.department_id.as_str())
        {
            course_count += 1;
            *courses_by_college
                .entry(college_name(&c.college_id))
                .or_insert(0) += 1;
        }
    }

    let mut instructors_by_college = BTreeMap::new();
    let mut instructor_count = 0;
    for i in &snapshot.instructors {
        if department_ids.contains(i.department_id.as_str()) {
            instructor_count += 1;
            *instructors_by_college
                .entry(college_name_via_department(&i.department_id))
                .or_insert(0) += 1;
        }
    }

    let mut student_groups_by_college = BTreeMap::new();
    let mut student_group_count = 0;
    for g in &snapshot.student_groups {
        if department_ids.contains(g.department_id.as_str()) {
            student_group_count += 1;
            *student_groups_by_college
                .entry(college_name_via_department(&g.department_id))
                .or_insert(0) += 1;
        }
    }

    let classroom_count = snapshot
        .classrooms
        .iter()
        .filter(|r| r.campus_id == campus_id)
        .count();

    let mut missing = Vec::new();
    for (name, n) in [
        ("classrooms", classroom_count),
        ("courses", course_count),
        ("instructors", instructor_count),
        ("studentGroups", student_group_count),
    ] {
        if n == 0 {
            missing.push(name.to_string());
        }
    }

    ReadinessReport {
        campus_id: campus_id.to_string(),
        campus_name: snapshot.campus(campus_id).map(|c| c.name.clone()),
        classroom_count,
        course_count,
        instructor_count,
        student_group_count,
        courses_by_college,
        instructors_by_college,
        student_groups_by_college,
        generation_feasible: missing.is_empty(),
        missing,
    }
}

pub fn evaluate_campus(store: &Store<'_>, campus_id: &str) -> Result<ReadinessReport> {
    let snapshot = hierarchy::read_snapshot(store, Some(campus_id))?;
    let report = evaluate(&snapshot, campus_id);
    tracing::info!(
        campus_id,
        classrooms = report.classroom_count,
        courses = report.course_count,
        instructors = report.instructor_count,
        student_groups = report.student_group_count,
        feasible = report.generation_feasible,
        "readiness evaluated"
    );
    Ok(report)
}
