mod backup;
mod cli;
mod commands;
mod consolidate;
mod db;
mod diagnostics;
mod error;
mod hierarchy;
mod ipc;
mod model;
mod orphans;
mod readiness;
mod store;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // stdout carries IPC responses and operator output; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Diagnose {
            workspace,
            campus,
            out,
            json,
        } => commands::run_diagnose(&workspace, campus.as_deref(), out, json),
        Commands::Migrate {
            workspace,
            plan,
            dry_run,
            backup_dir,
            json,
        } => commands::run_migrate(&workspace, &plan, dry_run, backup_dir, json),
        Commands::Unlock { workspace, campus } => commands::run_unlock(&workspace, &campus),
        Commands::Restore { workspace, bundle } => commands::run_restore(&workspace, &bundle),
        Commands::Serve => {
            commands::serve();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
