use crate::hierarchy::Snapshot;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanGroup {
    pub college_id: String,
    pub college_name: String,
    /// The unresolved campus reference, if the college had one at all.
    pub dangling_campus_id: Option<String>,
    pub department_ids: BTreeSet<String>,
    pub course_ids: BTreeSet<String>,
    pub instructor_ids: BTreeSet<String>,
    pub student_group_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanCounts {
    pub departments: usize,
    pub courses: usize,
    pub instructors: usize,
    pub student_groups: usize,
}

impl OrphanGroup {
    pub fn counts(&self) -> OrphanCounts {
        OrphanCounts {
            departments: self.department_ids.len(),
            courses: self.course_ids.len(),
            instructors: self.instructor_ids.len(),
            student_groups: self.student_group_ids.len(),
        }
    }
}

/// Groups every orphaned college with its transitive descendants. One pass
/// per relation, each lookup a set/map probe.
pub fn detect(snapshot: &Snapshot) -> Vec<OrphanGroup> {
    let mut groups: BTreeMap<&str, OrphanGroup> = snapshot
        .all_colleges
        .iter()
        .filter(|c| !snapshot.is_anchored(c))
        .map(|c| {
            (
                c.id.as_str(),
                OrphanGroup {
                    college_id: c.id.clone(),
                    college_name: c.name.clone(),
                    dangling_campus_id: c.campus_id.clone(),
                    department_ids: BTreeSet::new(),
                    course_ids: BTreeSet::new(),
                    instructor_ids: BTreeSet::new(),
                    student_group_ids: BTreeSet::new(),
                },
            )
        })
        .collect();

    let mut owner_of_department: HashMap<&str, &str> = HashMap::new();
    for d in &snapshot.departments {
        if let Some(g) = groups.get_mut(d.college_id.as_str()) {
            g.department_ids.insert(d.id.clone());
            owner_of_department.insert(d.id.as_str(), d.college_id.as_str());
        }
    }

    for c in &snapshot.courses {
        let owner = if groups.contains_key(c.college_id.as_str()) {
            Some(c.college_id.as_str())
        } else {
            owner_of_department.get(c.department_id.as_str()).copied()
        };
        if let Some(g) = owner.and_then(|id| groups.get_mut(id)) {
            g.course_ids.insert(c.id.clone());
        }
    }

    for i in &snapshot.instructors {
        if let Some(owner) = owner_of_department.get(i.department_id.as_str()) {
            if let Some(g) = groups.get_mut(owner) {
                g.instructor_ids.insert(i.id.clone());
            }
        }
    }

    for sg in &snapshot.student_groups {
        if let Some(owner) = owner_of_department.get(sg.department_id.as_str()) {
            if let Some(g) = groups.get_mut(owner) {
                g.student_group_ids.insert(sg.id.clone());
            }
        }
    }

    groups.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityFinding {
    /// Department whose college row does not exist.
    #[serde(rename_all = "camelCase")]
    DanglingDepartment {
        department_id: String,
        college_id: String,
    },
    /// Course whose department belongs to a different college than the
    /// course's own college reference.
    #[serde(rename_all = "camelCase")]
    CourseParentMismatch {
        course_id: String,
        college_id: String,
        department_id: String,
        department_college_id: String,
    },
    /// Course, instructor or student group pointing at a missing department.
    #[serde(rename_all = "camelCase")]
    MissingDepartment {
        entity: String,
        id: String,
        department_id: String,
    },
}

pub fn integrity_findings(snapshot: &Snapshot) -> Vec<IntegrityFinding> {
    let college_ids: HashSet<&str> = snapshot
        .all_colleges
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    let departments = snapshot.department_index();
    let mut out = Vec::new();

    for d in &snapshot.departments {
        if !college_ids.contains(d.college_id.as_str()) {
            out.push(IntegrityFinding::DanglingDepartment {
                department_id: d.id.clone(),
                college_id: d.college_id.clone(),
            });
        }
    }

    for c in &snapshot.courses {
        match departments.get(c.department_id.as_str()) {
            Some(d) if d.college_id != c.college_id => {
                out.push(IntegrityFinding::CourseParentMismatch {
                    course_id: c.id.clone(),
                    college_id: c.college_id.clone(),
                    department_id: c.department_id.clone(),
                    department_college_id: d.college_id.clone(),
                });
            }
            Some(_) => {}
            None => out.push(IntegrityFinding::MissingDepartment {
                entity: "course".to_string(),
                id: c.id.clone(),
                department_id: c.department_id.clone(),
            }),
        }
    }

    let dept_refs = snapshot
        .instructors
        .iter()
        .map(|i| ("instructor", &i.id, &i.department_id))
        .chain(
            snapshot
                .student_groups
                .iter()
                .map(|g| ("studentGroup", &g.id, &g.department_id)),
        );
    for (entity, id, department_id) in dept_refs {
        if !departments.contains_key(department_id.as_str()) {
            out.push(IntegrityFinding::MissingDepartment {
                entity: entity.to_string(),
                id: id.clone(),
                department_id: department_id.clone(),
            });
        }
    }

    out
}
