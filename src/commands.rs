use crate::backup;
use crate::consolidate::{self, ConsolidationPlan, MigrationOutcome, MigrationStep, RulePreview};
use crate::db;
use crate::diagnostics::{self, DiagnosticReport, DEFAULT_REPORT_FILE};
use crate::error::RepairError;
use crate::ipc;
use crate::readiness::ReadinessReport;
use crate::store::Store;
use anyhow::Context;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

pub fn run_diagnose(
    workspace: &Path,
    campus: Option<&str>,
    out: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let conn = db::open_db(workspace)
        .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    let report = diagnostics::build_report(&Store::new(&conn), campus);
    let out_path = out.unwrap_or_else(|| workspace.join(DEFAULT_REPORT_FILE));
    diagnostics::write_report(&report, &out_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_summary(&report);
        println!("report: {}", out_path.display());
    }
    Ok(())
}

fn print_report_summary(report: &DiagnosticReport) {
    let t = &report.totals;
    println!(
        "campuses {}  colleges {}  departments {}  courses {}  instructors {}  student groups {}  classrooms {}",
        t.campuses, t.colleges, t.departments, t.courses, t.instructors, t.student_groups, t.classrooms
    );
    if let Some(target) = &report.target {
        match (&target.readiness, &target.error) {
            (Some(r), _) => print_readiness(r),
            (None, Some(e)) => println!("target '{}': {}", target.selector, e),
            (None, None) => {}
        }
    }
    if report.orphan_groups.is_empty() {
        println!("no orphaned colleges");
    }
    for g in &report.orphan_groups {
        println!(
            "orphaned college {} ({}): {} departments, {} courses, {} instructors, {} student groups",
            g.group.college_name,
            g.group.college_id,
            g.counts.departments,
            g.counts.courses,
            g.counts.instructors,
            g.counts.student_groups
        );
    }
    if !report.integrity_findings.is_empty() {
        println!("integrity findings: {}", report.integrity_findings.len());
    }
    for w in &report.warnings {
        println!("warning: {w}");
    }
}

fn print_readiness(r: &ReadinessReport) {
    println!(
        "campus {} ({}): classrooms {}  courses {}  instructors {}  student groups {}",
        r.campus_name.as_deref().unwrap_or("?"),
        r.campus_id,
        r.classroom_count,
        r.course_count,
        r.instructor_count,
        r.student_group_count
    );
    if r.generation_feasible {
        println!("  schedule generation: feasible");
    } else {
        println!("  schedule generation: blocked (missing {})", r.missing.join(", "));
    }
}

pub fn run_migrate(
    workspace: &Path,
    plan_path: &Path,
    dry_run: bool,
    backup_dir: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let conn = db::open_db(workspace)
        .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    let store = Store::new(&conn);
    let plan = ConsolidationPlan::from_path(plan_path)?;

    // Validates the plan against the store; a rejected plan gets no backup.
    let rules = consolidate::preview(&store, &plan)?;
    if dry_run {
        if json {
            println!("{}", serde_json::to_string_pretty(&rules)?);
        } else {
            print_preview(&rules);
        }
        return Ok(());
    }

    let backup_dir = backup_dir.unwrap_or_else(|| workspace.join("backups"));
    let bundle = backup::backup_workspace(workspace, &backup_dir)
        .context("pre-migration backup failed; nothing was changed")?;
    println!("backup: {}", bundle.bundle_path.display());

    let outcome = match consolidate::apply(&store, &plan) {
        Ok(o) => o,
        Err(RepairError::MigrationFailed {
            step,
            progress,
            source,
        }) => {
            for s in &progress.completed {
                eprintln!("completed: {:<22} {}", s.step.as_str(), s.count);
            }
            return Err(anyhow::Error::new(*source).context(format!(
                "migration aborted during {step}; fix the cause and re-run, or restore with `campusd restore --workspace {} --bundle {}`",
                workspace.display(),
                bundle.bundle_path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_preview(rules: &[RulePreview]) {
    for r in rules {
        println!(
            "{} -> {}/{}/{}",
            r.label.as_deref().unwrap_or("rule"),
            r.destination.campus_id,
            r.destination.college_id,
            r.destination.department_id
        );
        println!(
            "  move: {} courses, {} instructors, {} student groups",
            r.courses, r.instructors, r.student_groups
        );
        println!(
            "  delete: {} departments, colleges [{}]",
            r.departments,
            r.colleges_to_delete.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        if !r.already_migrated.is_empty() {
            println!(
                "  already migrated: [{}]",
                r.already_migrated.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
    }
}

fn print_outcome(outcome: &MigrationOutcome) {
    println!("run {}", outcome.run_id);
    for s in &outcome.progress.completed {
        println!("  {:<22} {}", s.step.as_str(), s.count);
    }
    let p = &outcome.progress;
    if p.count(MigrationStep::DeleteColleges) == 0 && p.count(MigrationStep::MoveCourses) == 0 {
        println!("nothing left to migrate");
    }
    for r in &outcome.readiness {
        print_readiness(r);
    }
}

pub fn run_unlock(workspace: &Path, campus_id: &str) -> anyhow::Result<()> {
    let conn = db::open_db(workspace)
        .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    match Store::new(&conn).break_lock(campus_id)? {
        Some(stale) => println!(
            "released lock on {} held by {} since {}",
            stale.campus_id, stale.holder, stale.acquired_at
        ),
        None => println!("no migration lock held on {campus_id}"),
    }
    Ok(())
}

pub fn run_restore(workspace: &Path, bundle: &Path) -> anyhow::Result<()> {
    let digest = backup::restore_workspace(bundle, workspace)?;
    println!("restored {} (sha256 {})", workspace.display(), digest);
    Ok(())
}

pub fn serve() {
    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::debug!("stdin closed, sidecar exiting");
}
