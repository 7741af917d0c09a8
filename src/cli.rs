use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "campusd",
    about = "Campus hierarchy diagnostics and orphan consolidation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the diagnostic report for a workspace
    Diagnose {
        /// Workspace directory holding campus.sqlite3
        #[arg(long)]
        workspace: PathBuf,

        /// Campus id or name fragment to evaluate for readiness
        #[arg(long)]
        campus: Option<String>,

        /// Report path (defaults to campus-diagnostics.json in the workspace)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Consolidate orphaned colleges according to a plan file
    Migrate {
        /// Workspace directory holding campus.sqlite3
        #[arg(long)]
        workspace: PathBuf,

        /// Consolidation plan (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Show what would move without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Where the pre-migration backup bundle goes (defaults to <workspace>/backups)
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Release a migration lock left behind by a run that did not finish
    Unlock {
        /// Workspace directory holding campus.sqlite3
        #[arg(long)]
        workspace: PathBuf,

        /// Destination campus id the lock is keyed on
        #[arg(long)]
        campus: String,
    },

    /// Restore a workspace database from a backup bundle
    Restore {
        #[arg(long)]
        workspace: PathBuf,

        #[arg(long)]
        bundle: PathBuf,
    },

    /// Run the JSON-lines IPC loop on stdin/stdout
    Serve,
}
