mod db;
mod filters;
pub mod retry;
pub(crate) mod rows;
pub mod schema;
mod sqlite;

pub use db::Database;
pub use filters::{EntityFilter, TaskFilter};
pub use retry::RetryPolicy;
pub use sqlite::SqliteStore;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Read-modify-write callback run inside the write transaction.
pub type Mutation<'a, T> = &'a mut dyn FnMut(&mut T) -> Result<()>;

/// Store defines the per-workspace row storage. Every mutating method is one
/// atomic write; every read hides soft-deleted rows unless asked otherwise.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Task operations
    fn create_task(&self, task: &Task) -> Result<i64>;
    fn get_task(&self, id: i64, include_deleted: bool) -> Result<Option<Task>>;
    /// Fails `NotFound` when the task is missing or deleted.
    fn update_task(&self, id: i64, apply: Mutation<'_, Task>) -> Result<Task>;
    fn list_tasks(&self, filter: &TaskFilter, page: Pagination) -> Result<(Vec<Task>, i64)>;
    fn search_tasks(&self, term: &str, page: Pagination) -> Result<(Vec<Task>, i64)>;
    fn list_child_tasks(&self, parent_id: i64) -> Result<Vec<Task>>;
    fn list_tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>>;
    /// Statuses of the live tasks among `ids`; missing or deleted ids are absent.
    fn live_task_statuses(&self, ids: &[i64]) -> Result<HashMap<i64, TaskStatus>>;
    /// Returns the number of task and link rows soft-deleted.
    fn delete_task(&self, id: i64, cascade: bool, at: DateTime<Utc>) -> Result<usize>;

    // Entity operations
    /// Fails `Duplicate` when a live entity shares (entity_type, identifier).
    fn create_entity(&self, entity: &Entity) -> Result<i64>;
    fn get_entity(&self, id: i64, include_deleted: bool) -> Result<Option<Entity>>;
    fn update_entity(&self, id: i64, apply: Mutation<'_, Entity>) -> Result<Entity>;
    fn list_entities(&self, filter: &EntityFilter, page: Pagination)
    -> Result<(Vec<Entity>, i64)>;
    fn search_entities(
        &self,
        term: &str,
        entity_type: Option<EntityType>,
        page: Pagination,
    ) -> Result<(Vec<Entity>, i64)>;
    /// Soft-deletes the entity and its live links. Returns the link count.
    fn delete_entity(&self, id: i64, at: DateTime<Utc>) -> Result<usize>;

    // Task-entity link operations
    fn create_link(&self, link: &TaskEntityLink) -> Result<TaskEntityLink>;
    fn delete_link(&self, task_id: i64, entity_id: i64, at: DateTime<Utc>) -> Result<bool>;
    fn list_task_entities(
        &self,
        task_id: i64,
        page: Pagination,
    ) -> Result<(Vec<LinkedEntity>, i64)>;
    fn list_entity_tasks(
        &self,
        entity_id: i64,
        filter: &TaskFilter,
        page: Pagination,
    ) -> Result<(Vec<LinkedTask>, i64)>;

    // Maintenance
    /// Physically removes rows soft-deleted before `cutoff`.
    fn purge_deleted(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport>;
    fn stats(&self) -> Result<WorkspaceStats>;
}
