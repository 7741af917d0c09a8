//! Read-only snapshots of the campus hierarchy.
//!
//! A snapshot is an arena of plain records plus the campus id set needed to
//! tell anchored colleges from orphaned ones. Components downstream of the
//! reader work on the snapshot with id-indexed maps instead of going back to
//! the store per record.

use crate::error::{RepairError, Result};
use crate::model::{
    Campus, Classroom, College, Course, Department, EntityKind, Instructor, ParentField,
    StudentGroup,
};
use crate::store::{Filter, Store};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// `None` when the snapshot covers the whole store.
    pub scope: Option<String>,
    pub campuses: Vec<Campus>,
    pub colleges: Vec<College>,
    pub departments: Vec<Department>,
    pub courses: Vec<Course>,
    pub instructors: Vec<Instructor>,
    pub student_groups: Vec<StudentGroup>,
    pub classrooms: Vec<Classroom>,
    /// Every college in the store, regardless of scope.
    pub all_colleges: Vec<College>,
    pub known_campus_ids: BTreeSet<String>,
}

impl Snapshot {
    pub fn college_index(&self) -> HashMap<&str, &College> {
        self.all_colleges
            .iter()
            .map(|c| (c.id.as_str(), c))
            .collect()
    }

    pub fn department_index(&self) -> HashMap<&str, &Department> {
        self.departments.iter().map(|d| (d.id.as_str(), d)).collect()
    }

    pub fn campus(&self, campus_id: &str) -> Option<&Campus> {
        self.campuses.iter().find(|c| c.id == campus_id)
    }

    pub fn is_anchored(&self, college: &College) -> bool {
        college
            .campus_id
            .as_deref()
            .is_some_and(|id| self.known_campus_ids.contains(id))
    }
}

fn id_set<'a, I>(ids: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    ids.into_iter().cloned().collect()
}

pub fn read_snapshot(store: &Store<'_>, campus_id: Option<&str>) -> Result<Snapshot> {
    let all_campuses = store.find_campuses(&Filter::All)?;
    let known_campus_ids = id_set(all_campuses.iter().map(|c| &c.id));
    let all_colleges = store.find_colleges(&Filter::All)?;

    let Some(campus_id) = campus_id else {
        return Ok(Snapshot {
            scope: None,
            campuses: all_campuses,
            colleges: all_colleges.clone(),
            departments: store.find_departments(&Filter::All)?,
            courses: store.find_courses(&Filter::All)?,
            instructors: store.find_instructors(&Filter::All)?,
            student_groups: store.find_student_groups(&Filter::All)?,
            classrooms: store.find_classrooms(&Filter::All)?,
            all_colleges,
            known_campus_ids,
        });
    };

    let campuses: Vec<Campus> = all_campuses
        .into_iter()
        .filter(|c| c.id == campus_id)
        .collect();
    if campuses.is_empty() {
        return Err(RepairError::not_found(EntityKind::Campus, campus_id));
    }

    let colleges: Vec<College> = all_colleges
        .iter()
        .filter(|c| c.campus_id.as_deref() == Some(campus_id))
        .cloned()
        .collect();
    let college_ids = id_set(colleges.iter().map(|c| &c.id));

    let departments =
        store.find_departments(&Filter::FieldIn(ParentField::CollegeId, college_ids.clone()))?;
    let department_ids = id_set(departments.iter().map(|d| &d.id));

    // Courses hang off both parents; take the union so a course with a stale
    // department id still shows up under its college (and vice versa).
    let mut courses =
        store.find_courses(&Filter::FieldIn(ParentField::CollegeId, college_ids))?;
    let seen = id_set(courses.iter().map(|c| &c.id));
    courses.extend(
        store
            .find_courses(&Filter::FieldIn(
                ParentField::DepartmentId,
                department_ids.clone(),
            ))?
            .into_iter()
            .filter(|c| !seen.contains(&c.id)),
    );
    courses.sort_by(|a, b| a.id.cmp(&b.id));

    let instructors = store.find_instructors(&Filter::FieldIn(
        ParentField::DepartmentId,
        department_ids.clone(),
    ))?;
    let student_groups =
        store.find_student_groups(&Filter::FieldIn(ParentField::DepartmentId, department_ids))?;
    let classrooms = store.find_classrooms(&Filter::field(ParentField::CampusId, [campus_id]))?;

    tracing::debug!(
        campus_id,
        colleges = colleges.len(),
        departments = departments.len(),
        courses = courses.len(),
        "loaded campus snapshot"
    );

    Ok(Snapshot {
        scope: Some(campus_id.to_string()),
        campuses,
        colleges,
        departments,
        courses,
        instructors,
        student_groups,
        classrooms,
        all_colleges,
        known_campus_ids,
    })
}

/// Full snapshot for diagnostics: a failing table load is recorded in the
/// returned warnings and replaced by an empty collection.
pub fn read_snapshot_best_effort(store: &Store<'_>) -> (Snapshot, Vec<String>) {
    let mut warnings = Vec::new();

    fn or_empty<T>(res: Result<Vec<T>>, what: &str, warnings: &mut Vec<String>) -> Vec<T> {
        match res {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(table = what, error = %e, "diagnostic load failed");
                warnings.push(format!("failed to load {}: {}", what, e));
                Vec::new()
            }
        }
    }

    let campuses = or_empty(store.find_campuses(&Filter::All), "campuses", &mut warnings);
    let colleges = or_empty(store.find_colleges(&Filter::All), "colleges", &mut warnings);
    let departments = or_empty(
        store.find_departments(&Filter::All),
        "departments",
        &mut warnings,
    );
    let courses = or_empty(store.find_courses(&Filter::All), "courses", &mut warnings);
    let instructors = or_empty(
        store.find_instructors(&Filter::All),
        "instructors",
        &mut warnings,
    );
    let student_groups = or_empty(
        store.find_student_groups(&Filter::All),
        "student_groups",
        &mut warnings,
    );
    let classrooms = or_empty(
        store.find_classrooms(&Filter::All),
        "classrooms",
        &mut warnings,
    );

    let known_campus_ids = id_set(campuses.iter().map(|c| &c.id));
    let snapshot = Snapshot {
        scope: None,
        campuses,
        all_colleges: colleges.clone(),
        colleges,
        departments,
        courses,
        instructors,
        student_groups,
        classrooms,
        known_campus_ids,
    };
    (snapshot, warnings)
}

/// Resolves an operator-supplied campus selector: exact id first, then a
/// case-insensitive name fragment that must match exactly one campus.
pub fn resolve_campus(store: &Store<'_>, selector: &str) -> Result<Campus> {
    let selector = selector.trim();
    if let Some(c) = store.find_campuses(&Filter::ids([selector]))?.pop() {
        return Ok(c);
    }

    let campuses = store.find_campuses(&Filter::All)?;

    let needle = selector.to_lowercase();
    let mut matches: Vec<Campus> = campuses
        .into_iter()
        .filter(|c| !needle.is_empty() && c.name.to_lowercase().contains(&needle))
        .collect();
    match matches.len() {
        0 => Err(RepairError::not_found(EntityKind::Campus, selector)),
        1 => Ok(matches.remove(0)),
        _ => Err(RepairError::AmbiguousSelector {
            selector: selector.to_string(),
            candidates: matches
                .iter()
                .map(|c| format!("{} ({})", c.name, c.id))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}
