mod commands;
mod entity;
pub mod output;
mod task;
mod workspace;

pub use commands::{EntityCommands, PageArgs, TaskCommands, WorkspaceCommands};
pub use entity::run_entity;
pub use output::{error_body, print_json};
pub use task::run_task;
pub use workspace::{confirm_action, run_workspace};
