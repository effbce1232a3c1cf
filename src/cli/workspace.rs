use std::path::Path;

use serde_json::{Value, json};

use super::commands::WorkspaceCommands;
use super::output::to_json;
use crate::engine::Tracker;
use crate::workspace::resolve_current;

pub fn run_workspace(
    tracker: &Tracker,
    current: Option<&Path>,
    command: WorkspaceCommands,
) -> anyhow::Result<Value> {
    let target = |path: Option<&Path>| -> anyhow::Result<std::path::PathBuf> {
        match path {
            Some(p) => Ok(p.to_path_buf()),
            None => Ok(resolve_current(current)?.path),
        }
    };

    match command {
        WorkspaceCommands::List => {
            let entries = tracker.list_workspaces()?;
            Ok(json!({ "count": entries.len(), "items": entries }))
        }
        WorkspaceCommands::Show { path } => {
            to_json(&tracker.get_workspace(&target(path.as_deref())?)?)
        }
        WorkspaceCommands::Name { name, path } => {
            to_json(&tracker.set_workspace_name(&target(path.as_deref())?, &name)?)
        }
        WorkspaceCommands::Forget { path } => {
            let removed = tracker.forget_workspace(&target(path.as_deref())?)?;
            Ok(json!({ "success": removed }))
        }
    }
}

/// Asks before destroying data unless `yes` is set.
pub fn confirm_action(message: &str, yes: bool, non_interactive: bool) -> anyhow::Result<bool> {
    if yes {
        Ok(true)
    } else if non_interactive {
        anyhow::bail!("--yes is required for destructive operations in non-interactive mode");
    } else {
        Ok(inquire::Confirm::new(message)
            .with_default(false)
            .prompt()?)
    }
}
