use serde_json::{Value, json};

use super::commands::{PageArgs, TaskCommands};
use super::output::to_json;
use crate::engine::Workspace;
use crate::store::TaskFilter;
use crate::types::{Mode, NewTask, Pagination, TaskPatch};

pub(crate) fn page_options(args: &PageArgs) -> anyhow::Result<(Pagination, Mode)> {
    let page = Pagination::from_optional(args.limit, args.offset)?;
    let mode = Mode::parse(args.mode.as_deref())?;
    Ok((page, mode))
}

/// `Some("")` on the command line clears a nullable field.
pub(crate) fn clearable(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| if v.is_empty() { None } else { Some(v) })
}

pub fn run_task(workspace: &Workspace, command: TaskCommands) -> anyhow::Result<Value> {
    match command {
        TaskCommands::Create {
            title,
            description,
            status,
            priority,
            parent,
            depends_on,
            blocker_reason,
            tags,
            files,
            created_by,
        } => {
            let input = NewTask {
                title,
                description,
                status: status.as_deref().map(str::parse).transpose()?,
                priority: priority.as_deref().map(str::parse).transpose()?,
                parent_task_id: parent,
                depends_on,
                blocker_reason,
                tags,
                file_references: files,
                created_by,
            };
            to_json(&workspace.create_task(input)?)
        }
        TaskCommands::Get { id } => to_json(&workspace.get_task(id)?),
        TaskCommands::Update {
            id,
            title,
            description,
            status,
            priority,
            parent,
            no_parent,
            depends_on,
            no_depends_on,
            blocker_reason,
            tags,
            files,
        } => {
            let patch = TaskPatch {
                title,
                description: clearable(description),
                status: status.as_deref().map(str::parse).transpose()?,
                priority: priority.as_deref().map(str::parse).transpose()?,
                parent_task_id: if no_parent { Some(None) } else { parent.map(Some) },
                depends_on: if no_depends_on {
                    Some(Vec::new())
                } else {
                    depends_on
                },
                blocker_reason: clearable(blocker_reason),
                tags: clearable(tags),
                file_references: files,
            };
            to_json(&workspace.update_task(id, patch)?)
        }
        TaskCommands::List {
            status,
            priority,
            parent,
            tags,
            include_deleted,
            page,
        } => {
            let (pagination, mode) = page_options(&page)?;
            let filter = TaskFilter {
                status,
                priority,
                parent_task_id: parent,
                tags,
                include_deleted,
            };
            to_json(&workspace.list_tasks(&filter, pagination)?.render(mode))
        }
        TaskCommands::Search { term, page } => {
            let (pagination, mode) = page_options(&page)?;
            to_json(&workspace.search_tasks(&term, pagination)?.render(mode))
        }
        TaskCommands::Delete { id, cascade } => to_json(&workspace.delete_task(id, cascade)?),
        TaskCommands::Tree { id } => to_json(&workspace.get_task_tree(id)?),
        TaskCommands::Blocked => {
            let tasks = workspace.get_blocked_tasks()?;
            Ok(json!({ "count": tasks.len(), "items": tasks }))
        }
        TaskCommands::Next => {
            let tasks = workspace.get_next_tasks()?;
            Ok(json!({ "count": tasks.len(), "items": tasks }))
        }
        TaskCommands::Entities { id, page } => {
            let (pagination, mode) = page_options(&page)?;
            to_json(&workspace.get_task_entities(id, pagination)?.render(mode))
        }
    }
}
