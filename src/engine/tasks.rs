use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use super::{Workspace, advance, now};
use crate::error::{Error, Result};
use crate::store::TaskFilter;
use crate::types::*;
use crate::validation::{
    dedup_ids, normalize_tags, validate_blocker, validate_description, validate_search_term,
    validate_title,
};

fn clean_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

impl Workspace {
    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        self.touch();

        let title = validate_title(&input.title)?;
        validate_description(input.description.as_deref())?;
        let status = input.status.unwrap_or_default();
        let priority = input.priority.unwrap_or_default();
        validate_blocker(status, input.blocker_reason.as_deref())?;
        let tags = normalize_tags(input.tags.as_deref())?;

        let now = now();
        let mut task = Task {
            id: 0,
            title,
            description: input.description,
            status,
            priority,
            parent_task_id: input.parent_task_id,
            depends_on: dedup_ids(&input.depends_on),
            blocker_reason: clean_reason(input.blocker_reason.as_deref()),
            tags,
            file_references: input.file_references,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
            completed_at: (status == TaskStatus::Done).then_some(now),
            deleted_at: None,
        };
        task.id = self.store.create_task(&task)?;

        info!(task_id = task.id, status = %task.status, "created task");
        Ok(task)
    }

    pub fn get_task(&self, id: i64) -> Result<Task> {
        self.touch();
        self.store
            .get_task(id, false)?
            .ok_or_else(|| Error::not_found("task", id))
    }

    /// Applies the supplied fields and re-validates the merged row inside one
    /// write transaction.
    pub fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task> {
        self.touch();

        let title = patch.title.as_deref().map(validate_title).transpose()?;
        if let Some(description) = &patch.description {
            validate_description(description.as_deref())?;
        }
        let tags = patch
            .tags
            .as_ref()
            .map(|t| normalize_tags(t.as_deref()))
            .transpose()?;

        let mut apply = |task: &mut Task| -> Result<()> {
            let previous_status = task.status;

            if let Some(title) = &title {
                task.title = title.clone();
            }
            if let Some(description) = &patch.description {
                task.description = description.clone();
            }
            if let Some(status) = patch.status {
                task.status = status;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(parent) = patch.parent_task_id {
                task.parent_task_id = parent;
            }
            if let Some(depends_on) = &patch.depends_on {
                task.depends_on = dedup_ids(depends_on);
            }
            if let Some(reason) = &patch.blocker_reason {
                validate_blocker(task.status, reason.as_deref())?;
                task.blocker_reason = clean_reason(reason.as_deref());
            } else if task.status != TaskStatus::Blocked {
                task.blocker_reason = None;
            }
            if let Some(tags) = &tags {
                task.tags = tags.clone();
            }
            if let Some(refs) = &patch.file_references {
                task.file_references = refs.clone();
            }

            validate_blocker(task.status, task.blocker_reason.as_deref())?;

            let now = advance(task.updated_at);
            match (previous_status, task.status) {
                (TaskStatus::Done, TaskStatus::Done) => {}
                (_, TaskStatus::Done) => task.completed_at = Some(now),
                _ => task.completed_at = None,
            }
            task.updated_at = now;
            Ok(())
        };

        let task = self.store.update_task(id, &mut apply)?;
        debug!(task_id = id, status = %task.status, "updated task");
        Ok(task)
    }

    pub fn list_tasks(&self, filter: &TaskFilter, page: Pagination) -> Result<Page<Task>> {
        self.touch();
        let (items, total) = self.store.list_tasks(filter, page)?;
        Ok(Page::new(items, total, page))
    }

    /// Case-insensitive substring match on title or description.
    pub fn search_tasks(&self, term: &str, page: Pagination) -> Result<Page<Task>> {
        self.touch();
        let term = validate_search_term(term)?;
        let (items, total) = self.store.search_tasks(&term, page)?;
        Ok(Page::new(items, total, page))
    }

    /// Soft-deletes the task. With `cascade`, every live descendant and every
    /// live link to any of them goes too, in the same transaction.
    pub fn delete_task(&self, id: i64, cascade: bool) -> Result<DeleteResult> {
        self.touch();
        let deleted_count = self.store.delete_task(id, cascade, now())?;
        info!(task_id = id, cascade, deleted_count, "deleted task");
        Ok(DeleteResult {
            success: true,
            deleted_count,
        })
    }

    pub fn get_task_tree(&self, id: i64) -> Result<TaskTree> {
        let root = self.get_task(id)?;
        let mut visited = HashSet::new();
        self.build_tree(root, &mut visited)
    }

    fn build_tree(&self, task: Task, visited: &mut HashSet<i64>) -> Result<TaskTree> {
        visited.insert(task.id);
        let mut children = Vec::new();
        for child in self.store.list_child_tasks(task.id)? {
            if !visited.insert(child.id) {
                warn!(task_id = child.id, parent = task.id, "parent cycle, skipping subtree");
                continue;
            }
            children.push(self.build_tree(child, visited)?);
        }
        Ok(TaskTree { task, children })
    }

    pub fn get_blocked_tasks(&self) -> Result<Vec<Task>> {
        self.touch();
        self.store.list_tasks_with_status(TaskStatus::Blocked)
    }

    /// Todo tasks whose dependencies are all live and done, highest priority
    /// first, then oldest. Missing or deleted dependencies keep a task out.
    pub fn get_next_tasks(&self) -> Result<Vec<Task>> {
        self.touch();
        let todo = self.store.list_tasks_with_status(TaskStatus::Todo)?;

        let dependency_ids: Vec<i64> = todo
            .iter()
            .flat_map(|t| t.depends_on.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let statuses = self.store.live_task_statuses(&dependency_ids)?;

        let mut ready: Vec<Task> = todo
            .into_iter()
            .filter(|task| {
                task.depends_on
                    .iter()
                    .all(|dep| statuses.get(dep) == Some(&TaskStatus::Done))
            })
            .collect();
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(ready)
    }
}
