//! Moves orphaned college subtrees under an operator-chosen destination and
//! removes the drained source rows.
//!
//! The sequence is ordered so that no delete ever runs while a child still
//! references the row, and every step is a set-based statement keyed on the
//! *source* ids. Re-running after a partial failure therefore only touches
//! rows that have not moved yet; rows already moved no longer match.

use crate::error::{RepairError, Result};
use crate::hierarchy::{self, Snapshot};
use crate::model::{EntityKind, ParentField};
use crate::orphans::{self, OrphanGroup};
use crate::readiness::{self, ReadinessReport};
use crate::store::{Assignment, Filter, Store};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub campus_id: String,
    pub college_id: String,
    pub department_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationRule {
    #[serde(default)]
    pub label: Option<String>,
    /// Orphaned college ids merged into `destination`.
    pub sources: Vec<String>,
    pub destination: Destination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationPlan {
    pub rules: Vec<ConsolidationRule>,
}

impl ConsolidationPlan {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RepairError::InvalidPlan(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| RepairError::InvalidPlan(format!("{}: {}", path.display(), e)))
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| RepairError::InvalidPlan(e.to_string()))
    }

    pub fn destination_campuses(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .map(|r| r.destination.campus_id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStep {
    MoveCourses,
    PartitionDepartments,
    MoveInstructors,
    MoveStudentGroups,
    DeleteDepartments,
    DeleteColleges,
    VerifyReadiness,
}

impl MigrationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStep::MoveCourses => "move courses",
            MigrationStep::PartitionDepartments => "partition departments",
            MigrationStep::MoveInstructors => "move instructors",
            MigrationStep::MoveStudentGroups => "move student groups",
            MigrationStep::DeleteDepartments => "delete departments",
            MigrationStep::DeleteColleges => "delete colleges",
            MigrationStep::VerifyReadiness => "verify readiness",
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCount {
    pub step: MigrationStep,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub completed: Vec<StepCount>,
}

impl MigrationProgress {
    fn record(&mut self, step: MigrationStep, count: usize) {
        tracing::info!(step = %step, count, "migration step complete");
        self.completed.push(StepCount { step, count });
    }

    pub fn last_completed(&self) -> Option<MigrationStep> {
        self.completed.last().map(|s| s.step)
    }

    pub fn count(&self, step: MigrationStep) -> usize {
        self.completed
            .iter()
            .filter(|s| s.step == step)
            .map(|s| s.count)
            .sum()
    }
}

/// A plan rule checked against the current store contents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRule {
    pub label: Option<String>,
    pub destination: Destination,
    /// Sources still present in the store.
    pub source_college_ids: BTreeSet<String>,
    /// Sources already gone, typically from an earlier run.
    pub already_migrated: BTreeSet<String>,
    pub department_ids: BTreeSet<String>,
    pub course_ids: BTreeSet<String>,
    pub instructor_ids: BTreeSet<String>,
    pub student_group_ids: BTreeSet<String>,
}

pub fn resolve_plan(
    snapshot: &Snapshot,
    orphan_groups: &[OrphanGroup],
    plan: &ConsolidationPlan,
) -> Result<Vec<ResolvedRule>> {
    if plan.rules.is_empty() {
        return Err(RepairError::InvalidPlan("plan has no rules".to_string()));
    }

    let colleges = snapshot.college_index();
    let departments = snapshot.department_index();
    let orphans: HashMap<&str, &OrphanGroup> = orphan_groups
        .iter()
        .map(|g| (g.college_id.as_str(), g))
        .collect();
    let destination_colleges: BTreeSet<&str> = plan
        .rules
        .iter()
        .map(|r| r.destination.college_id.as_str())
        .collect();

    let mut claimed: BTreeMap<&str, usize> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(plan.rules.len());

    for (idx, rule) in plan.rules.iter().enumerate() {
        if rule.sources.is_empty() {
            return Err(RepairError::InvalidPlan(format!("rule {} has no sources", idx)));
        }
        let dest = &rule.destination;

        if !snapshot.known_campus_ids.contains(&dest.campus_id) {
            return Err(RepairError::not_found(EntityKind::Campus, dest.campus_id.clone()));
        }
        let Some(dest_college) = colleges.get(dest.college_id.as_str()) else {
            return Err(RepairError::not_found(EntityKind::College, dest.college_id.clone()));
        };
        if dest_college.campus_id.as_deref() != Some(dest.campus_id.as_str()) {
            return Err(RepairError::IntegrityViolation(format!(
                "destination college {} does not belong to campus {}",
                dest.college_id, dest.campus_id
            )));
        }
        let Some(dest_department) = departments.get(dest.department_id.as_str()) else {
            return Err(RepairError::not_found(EntityKind::Department, dest.department_id.clone()));
        };
        if dest_department.college_id != dest.college_id {
            return Err(RepairError::IntegrityViolation(format!(
                "destination department {} does not belong to college {}",
                dest.department_id, dest.college_id
            )));
        }

        let mut out = ResolvedRule {
            label: rule.label.clone(),
            destination: dest.clone(),
            source_college_ids: BTreeSet::new(),
            already_migrated: BTreeSet::new(),
            department_ids: BTreeSet::new(),
            course_ids: BTreeSet::new(),
            instructor_ids: BTreeSet::new(),
            student_group_ids: BTreeSet::new(),
        };

        for source in &rule.sources {
            if let Some(prev) = claimed.insert(source.as_str(), idx) {
                return Err(RepairError::InvalidPlan(format!(
                    "college {} is a source in rules {} and {}",
                    source, prev, idx
                )));
            }
            if destination_colleges.contains(source.as_str()) {
                return Err(RepairError::InvalidPlan(format!(
                    "college {} is both a source and a destination",
                    source
                )));
            }
            if let Some(group) = orphans.get(source.as_str()) {
                out.source_college_ids.insert(source.clone());
                out.department_ids.extend(group.department_ids.iter().cloned());
                out.course_ids.extend(group.course_ids.iter().cloned());
                out.instructor_ids.extend(group.instructor_ids.iter().cloned());
                out.student_group_ids
                    .extend(group.student_group_ids.iter().cloned());
            } else if let Some(college) = colleges.get(source.as_str()) {
                return Err(RepairError::IntegrityViolation(format!(
                    "college {} is anchored to campus {} and will not be migrated",
                    source,
                    college.campus_id.as_deref().unwrap_or("?")
                )));
            } else {
                out.already_migrated.insert(source.clone());
            }
        }
        resolved.push(out);
    }

    Ok(resolved)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePreview {
    pub label: Option<String>,
    pub destination: Destination,
    pub colleges_to_delete: BTreeSet<String>,
    pub already_migrated: BTreeSet<String>,
    pub departments: usize,
    pub courses: usize,
    pub instructors: usize,
    pub student_groups: usize,
}

/// Dry run: what `apply` would move, without touching the store.
pub fn preview(store: &Store<'_>, plan: &ConsolidationPlan) -> Result<Vec<RulePreview>> {
    let snapshot = hierarchy::read_snapshot(store, None)?;
    let groups = orphans::detect(&snapshot);
    let rules = resolve_plan(&snapshot, &groups, plan)?;
    Ok(rules
        .into_iter()
        .map(|r| RulePreview {
            departments: r.department_ids.len(),
            courses: r.course_ids.len(),
            instructors: r.instructor_ids.len(),
            student_groups: r.student_group_ids.len(),
            label: r.label,
            destination: r.destination,
            colleges_to_delete: r.source_college_ids,
            already_migrated: r.already_migrated,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub run_id: String,
    pub progress: MigrationProgress,
    pub readiness: Vec<ReadinessReport>,
}

impl MigrationOutcome {
    pub fn all_feasible(&self) -> bool {
        self.readiness.iter().all(|r| r.generation_feasible)
    }
}

/// Runs the full consolidation sequence under an advisory lock on every
/// destination campus. Fails with `MigrationFailed` carrying the steps that
/// did complete.
pub fn apply(store: &Store<'_>, plan: &ConsolidationPlan) -> Result<MigrationOutcome> {
    let snapshot = hierarchy::read_snapshot(store, None)?;
    let groups = orphans::detect(&snapshot);
    let rules = resolve_plan(&snapshot, &groups, plan)?;

    let run_id = Uuid::new_v4().to_string();
    let mut locked: Vec<&str> = Vec::new();
    for campus_id in plan.destination_campuses() {
        if let Err(e) = store.acquire_lock(campus_id, &run_id) {
            release_locks(store, &locked, &run_id);
            return Err(e);
        }
        locked.push(campus_id);
    }

    tracing::info!(run_id = %run_id, rules = rules.len(), "consolidation started");
    let result = run_steps(store, &rules);
    release_locks(store, &locked, &run_id);

    let (progress, readiness) = result?;
    Ok(MigrationOutcome {
        run_id,
        progress,
        readiness,
    })
}

fn release_locks(store: &Store<'_>, campus_ids: &[&str], run_id: &str) {
    for campus_id in campus_ids {
        match store.release_lock(campus_id, run_id) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(campus_id, run_id, "migration lock already released"),
            Err(e) => tracing::error!(campus_id, run_id, error = %e, "failed to release migration lock"),
        }
    }
}

fn run_steps(
    store: &Store<'_>,
    rules: &[ResolvedRule],
) -> Result<(MigrationProgress, Vec<ReadinessReport>)> {
    let mut progress = MigrationProgress::default();

    macro_rules! step {
        ($step:expr, $body:expr) => {
            match (|| -> Result<usize> { $body })() {
                Ok(n) => progress.record($step, n),
                Err(e) => {
                    tracing::error!(step = %$step, error = %e, "migration step failed");
                    return Err(RepairError::MigrationFailed {
                        step: $step,
                        progress,
                        source: Box::new(e),
                    });
                }
            }
        };
    }

    // Courses carry both parent ids, so they move first and in one statement
    // per parent column.
    step!(MigrationStep::MoveCourses, {
        let mut moved = 0;
        for rule in rules {
            let to = [
                Assignment::new(ParentField::CollegeId, &rule.destination.college_id),
                Assignment::new(ParentField::DepartmentId, &rule.destination.department_id),
            ];
            moved += store.bulk_update(
                EntityKind::Course,
                &Filter::FieldIn(ParentField::CollegeId, rule.source_college_ids.clone()),
                &to,
            )?;
            moved += store.bulk_update(
                EntityKind::Course,
                &Filter::FieldIn(ParentField::DepartmentId, rule.department_ids.clone()),
                &to,
            )?;
        }
        Ok(moved)
    });

    // Department partitioning comes from the snapshot taken before step 1.
    step!(MigrationStep::PartitionDepartments, {
        Ok(rules.iter().map(|r| r.department_ids.len()).sum())
    });

    step!(MigrationStep::MoveInstructors, {
        let mut moved = 0;
        for rule in rules {
            moved += store.bulk_update(
                EntityKind::Instructor,
                &Filter::FieldIn(ParentField::DepartmentId, rule.department_ids.clone()),
                &[Assignment::new(
                    ParentField::DepartmentId,
                    &rule.destination.department_id,
                )],
            )?;
        }
        Ok(moved)
    });

    step!(MigrationStep::MoveStudentGroups, {
        let mut moved = 0;
        for rule in rules {
            moved += store.bulk_update(
                EntityKind::StudentGroup,
                &Filter::FieldIn(ParentField::DepartmentId, rule.department_ids.clone()),
                &[Assignment::new(
                    ParentField::DepartmentId,
                    &rule.destination.department_id,
                )],
            )?;
        }
        Ok(moved)
    });

    let department_ids: BTreeSet<String> = rules
        .iter()
        .flat_map(|r| r.department_ids.iter().cloned())
        .collect();
    step!(MigrationStep::DeleteDepartments, {
        let by_department = Filter::FieldIn(ParentField::DepartmentId, department_ids.clone());
        ensure_drained(
            store,
            EntityKind::Department,
            &[
                (EntityKind::Course, &by_department),
                (EntityKind::Instructor, &by_department),
                (EntityKind::StudentGroup, &by_department),
            ],
        )?;
        store.bulk_delete(EntityKind::Department, &department_ids)
    });

    let college_ids: BTreeSet<String> = rules
        .iter()
        .flat_map(|r| r.source_college_ids.iter().cloned())
        .collect();
    step!(MigrationStep::DeleteColleges, {
        let by_college = Filter::FieldIn(ParentField::CollegeId, college_ids.clone());
        ensure_drained(
            store,
            EntityKind::College,
            &[
                (EntityKind::Department, &by_college),
                (EntityKind::Course, &by_college),
            ],
        )?;
        store.bulk_delete(EntityKind::College, &college_ids)
    });

    let campuses: BTreeSet<&str> = rules
        .iter()
        .map(|r| r.destination.campus_id.as_str())
        .collect();
    let mut reports = Vec::with_capacity(campuses.len());
    step!(MigrationStep::VerifyReadiness, {
        for campus_id in &campuses {
            reports.push(readiness::evaluate_campus(store, campus_id)?);
        }
        Ok(reports.len())
    });

    Ok((progress, reports))
}

fn ensure_drained(
    store: &Store<'_>,
    parent: EntityKind,
    relations: &[(EntityKind, &Filter)],
) -> Result<()> {
    for (kind, filter) in relations {
        let remaining = store.count(*kind, filter)?;
        if remaining > 0 {
            return Err(RepairError::IntegrityViolation(format!(
                "{} {} row(s) still reference a source {}",
                remaining, kind, parent
            )));
        }
    }
    Ok(())
}
