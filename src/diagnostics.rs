use crate::hierarchy::{self, Snapshot};
use crate::orphans::{self, IntegrityFinding, OrphanCounts, OrphanGroup};
use crate::readiness::{self, ReadinessReport, UNRESOLVED_BUCKET};
use crate::store::Store;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_REPORT_FILE: &str = "campus-diagnostics.json";
const ORPHANED_CAMPUS_LABEL: &str = "ORPHANED (No Campus)";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampusSummary {
    pub id: String,
    pub name: String,
    pub city: Option<String>,
    pub colleges: Vec<CollegeSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeListing {
    pub id: String,
    pub name: String,
    pub campus_id: Option<String>,
    pub campus_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReadiness {
    pub selector: String,
    pub readiness: Option<ReadinessReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanSummary {
    #[serde(flatten)]
    pub group: OrphanGroup,
    pub counts: OrphanCounts,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub campuses: usize,
    pub colleges: usize,
    pub departments: usize,
    pub courses: usize,
    pub instructors: usize,
    pub student_groups: usize,
    pub classrooms: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub generated_at: String,
    pub campuses: Vec<CampusSummary>,
    pub all_colleges: Vec<CollegeListing>,
    pub target: Option<TargetReadiness>,
    pub orphan_groups: Vec<OrphanSummary>,
    pub integrity_findings: Vec<IntegrityFinding>,
    pub totals: Totals,
    pub courses_by_college: BTreeMap<String, usize>,
    pub instructors_by_college: BTreeMap<String, usize>,
    pub student_groups_by_college: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
}

/// Never fails: a section that cannot be computed is left empty and the
/// reason lands in `warnings` (or `target.error`).
pub fn build_report(store: &Store<'_>, target: Option<&str>) -> DiagnosticReport {
    let (snapshot, warnings) = hierarchy::read_snapshot_best_effort(store);

    let target = target.map(|selector| match hierarchy::resolve_campus(store, selector) {
        Ok(campus) => TargetReadiness {
            selector: selector.to_string(),
            readiness: Some(readiness::evaluate(&snapshot, &campus.id)),
            error: None,
        },
        Err(e) => {
            tracing::warn!(selector, error = %e, "target campus not resolved");
            TargetReadiness {
                selector: selector.to_string(),
                readiness: None,
                error: Some(e.to_string()),
            }
        }
    });

    let orphan_groups = orphans::detect(&snapshot)
        .into_iter()
        .map(|group| OrphanSummary {
            counts: group.counts(),
            group,
        })
        .collect();

    let (courses_by_college, instructors_by_college, student_groups_by_college) =
        global_breakdowns(&snapshot);

    DiagnosticReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        campuses: campus_summaries(&snapshot),
        all_colleges: college_listing(&snapshot),
        target,
        orphan_groups,
        integrity_findings: orphans::integrity_findings(&snapshot),
        totals: Totals {
            campuses: snapshot.campuses.len(),
            colleges: snapshot.all_colleges.len(),
            departments: snapshot.departments.len(),
            courses: snapshot.courses.len(),
            instructors: snapshot.instructors.len(),
            student_groups: snapshot.student_groups.len(),
            classrooms: snapshot.classrooms.len(),
        },
        courses_by_college,
        instructors_by_college,
        student_groups_by_college,
        warnings,
    }
}

fn campus_summaries(snapshot: &Snapshot) -> Vec<CampusSummary> {
    snapshot
        .campuses
        .iter()
        .map(|campus| CampusSummary {
            id: campus.id.clone(),
            name: campus.name.clone(),
            city: campus.city.clone(),
            colleges: snapshot
                .all_colleges
                .iter()
                .filter(|c| c.campus_id.as_deref() == Some(campus.id.as_str()))
                .map(|c| CollegeSummary {
                    id: c.id.clone(),
                    name: c.name.clone(),
                })
                .collect(),
        })
        .collect()
}

fn college_listing(snapshot: &Snapshot) -> Vec<CollegeListing> {
    snapshot
        .all_colleges
        .iter()
        .map(|c| CollegeListing {
            id: c.id.clone(),
            name: c.name.clone(),
            campus_id: c.campus_id.clone(),
            campus_name: c
                .campus_id
                .as_deref()
                .and_then(|id| snapshot.campus(id))
                .map(|campus| campus.name.clone())
                .unwrap_or_else(|| ORPHANED_CAMPUS_LABEL.to_string()),
        })
        .collect()
}

type Breakdown = BTreeMap<String, usize>;

fn global_breakdowns(snapshot: &Snapshot) -> (Breakdown, Breakdown, Breakdown) {
    let colleges = snapshot.college_index();
    let departments = snapshot.department_index();
    let by_college = |college_id: &str| {
        colleges
            .get(college_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| UNRESOLVED_BUCKET.to_string())
    };
    let by_department = |department_id: &str| {
        departments
            .get(department_id)
            .map(|d| by_college(&d.college_id))
            .unwrap_or_else(|| UNRESOLVED_BUCKET.to_string())
    };

    let mut courses = Breakdown::new();
    for c in &snapshot.courses {
        *courses.entry(by_college(&c.college_id)).or_insert(0) += 1;
    }
    let mut instructors = Breakdown::new();
    for i in &snapshot.instructors {
        *instructors.entry(by_department(&i.department_id)).or_insert(0) += 1;
    }
    let mut groups = Breakdown::new();
    for g in &snapshot.student_groups {
        *groups.entry(by_department(&g.department_id)).or_insert(0) += 1;
    }
    (courses, instructors, groups)
}

pub fn write_report(report: &DiagnosticReport, out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    let text = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write report {}", out_path.display()))?;
    tracing::info!(path = %out_path.display(), "diagnostic report written");
    Ok(())
}
