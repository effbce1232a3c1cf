use tracing::debug;

use super::{Workspace, now};
use crate::error::{Error, Result};
use crate::store::TaskFilter;
use crate::types::*;

impl Workspace {
    /// Links a live entity to a live task. An active link for the same pair
    /// fails `Duplicate`.
    pub fn link_entity_to_task(
        &self,
        task_id: i64,
        entity_id: i64,
        created_by: Option<&str>,
    ) -> Result<TaskEntityLink> {
        self.touch();
        let link = self.store.create_link(&TaskEntityLink {
            id: 0,
            task_id,
            entity_id,
            created_by: created_by.map(str::to_string),
            created_at: now(),
            deleted_at: None,
        })?;
        debug!(link_id = link.id, task_id, entity_id, "linked entity to task");
        Ok(link)
    }

    pub fn unlink_entity_from_task(&self, task_id: i64, entity_id: i64) -> Result<()> {
        self.touch();
        if !self.store.delete_link(task_id, entity_id, now())? {
            return Err(Error::not_found(
                "link",
                format!("task {task_id} / entity {entity_id}"),
            ));
        }
        debug!(task_id, entity_id, "unlinked entity from task");
        Ok(())
    }

    /// Live entities linked to the task, newest link first.
    pub fn get_task_entities(&self, task_id: i64, page: Pagination) -> Result<Page<LinkedEntity>> {
        self.touch();
        if self.store.get_task(task_id, false)?.is_none() {
            return Err(Error::not_found("task", task_id));
        }
        let (items, total) = self.store.list_task_entities(task_id, page)?;
        Ok(Page::new(items, total, page))
    }

    /// Live tasks linked to the entity, newest link first. `filter` narrows by
    /// task status, priority or tags.
    pub fn get_entity_tasks(
        &self,
        entity_id: i64,
        filter: &TaskFilter,
        page: Pagination,
    ) -> Result<Page<LinkedTask>> {
        self.touch();
        if self.store.get_entity(entity_id, false)?.is_none() {
            return Err(Error::not_found("entity", entity_id));
        }
        let filter = TaskFilter {
            include_deleted: false,
            ..filter.clone()
        };
        let (items, total) = self.store.list_entity_tasks(entity_id, &filter, page)?;
        Ok(Page::new(items, total, page))
    }
}
