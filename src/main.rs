use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use taskmill::cli::{
    EntityCommands, TaskCommands, WorkspaceCommands, confirm_action, error_body, print_json,
    run_entity, run_task, run_workspace,
};
use taskmill::config::EngineConfig;
use taskmill::engine::Tracker;

#[derive(Parser)]
#[command(name = "taskmill")]
#[command(about = "Per-project task and entity tracker", long_about = None)]
struct Cli {
    /// Workspace directory (defaults to $TASKMILL_WORKSPACE, then the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Data directory holding the registry and workspace stores
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Manage entities and their links to tasks
    Entity {
        #[command(subcommand)]
        command: EntityCommands,
    },

    /// Inspect and name registered workspaces
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },

    /// Permanently remove rows soft-deleted before the retention window
    Purge {
        /// Retention window in days (defaults to the configured value)
        #[arg(long)]
        days: Option<i64>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,

        /// Fail instead of prompting
        #[arg(long)]
        non_interactive: bool,
    },

    /// Show row counts for the current workspace
    Stats,
}

fn run(cli: Cli) -> anyhow::Result<Value> {
    let config = EngineConfig::load(cli.data_dir.as_deref())?;
    let tracker = Tracker::open(config)?;
    let explicit = cli.workspace.as_deref();

    match cli.command {
        Commands::Task { command } => run_task(&tracker.workspace(explicit)?, command),
        Commands::Entity { command } => run_entity(&tracker.workspace(explicit)?, command),
        Commands::Workspace { command } => run_workspace(&tracker, explicit, command),
        Commands::Purge {
            days,
            yes,
            non_interactive,
        } => {
            let workspace = tracker.workspace(explicit)?;
            let days = days.unwrap_or(tracker.config().retention_days);
            let message = format!(
                "Permanently remove rows in {} deleted more than {days} days ago?",
                workspace.path().display()
            );
            if !confirm_action(&message, yes, non_interactive)? {
                return Ok(json!({ "success": false, "cancelled": true }));
            }
            let report = workspace.purge_deleted(Some(days))?;
            Ok(json!({ "success": true, "purged": report, "total": report.total() }))
        }
        Commands::Stats => {
            let workspace = tracker.workspace(explicit)?;
            let stats = workspace.workspace_stats()?;
            Ok(json!({
                "workspace": workspace.path(),
                "storage_identifier": workspace.id().storage_identifier,
                "stats": stats,
            }))
        }
    }
}

/// Logs go to stderr so stdout stays machine readable.
fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("taskmill=info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize logging: {e}");
    }

    let cli = Cli::parse();

    let (body, code) = match run(cli) {
        Ok(value) => (value, ExitCode::SUCCESS),
        Err(e) => (error_body(&e), ExitCode::FAILURE),
    };
    if let Err(e) = print_json(&body) {
        eprintln!("failed to write output: {e}");
        return ExitCode::FAILURE;
    }
    code
}
