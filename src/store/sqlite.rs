use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

use super::db::Database;
use super::filters::{Conditions, EntityFilter, TaskFilter, like_pattern};
use super::retry::RetryPolicy;
use super::rows::*;
use super::schema;
use super::{Mutation, Store};
use crate::error::{Error, Result};
use crate::types::*;

/// SQLite parameter limit is far higher, this keeps statements short.
const ID_CHUNK: usize = 500;

pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        label: &str,
        busy_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            db: Database::open(db_path, label, busy_timeout, retry)?,
        })
    }

    /// Opens the file and provisions or migrates the schema.
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        label: &str,
        busy_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let store = Self::new(db_path, label, busy_timeout, retry)?;
        store.initialize()?;
        Ok(store)
    }

    /// Returns the underlying database for callers that need custom SQL.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn live_clause(alias: &str, include_deleted: bool) -> String {
    if include_deleted {
        String::new()
    } else {
        format!(" AND {alias}.deleted_at IS NULL")
    }
}

fn select_task(conn: &Connection, id: i64, include_deleted: bool) -> Result<Option<Task>> {
    conn.query_row(
        &format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1{}",
            live_clause("t", include_deleted)
        ),
        params![id],
        task_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn select_entity(conn: &Connection, id: i64, include_deleted: bool) -> Result<Option<Entity>> {
    conn.query_row(
        &format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1{}",
            live_clause("e", include_deleted)
        ),
        params![id],
        entity_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn is_live(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Parent must be a live task other than the task itself.
fn ensure_parent(conn: &Connection, parent_id: i64, task_id: Option<i64>) -> Result<()> {
    if Some(parent_id) == task_id {
        return Err(Error::validation(
            "parent_task_id",
            format!("task {parent_id} cannot be its own parent"),
        ));
    }
    if !is_live(conn, "tasks", parent_id)? {
        return Err(Error::validation(
            "parent_task_id",
            format!("parent task {parent_id} does not exist or is deleted"),
        ));
    }
    Ok(())
}

fn select_page<T>(
    conn: &Connection,
    columns: &str,
    from: &str,
    conditions: &Conditions,
    order_by: &str,
    page: Pagination,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<(Vec<T>, i64)> {
    let where_sql = conditions.where_sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {from} {where_sql}"),
        params_from_iter(conditions.params()),
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {columns} {from} {where_sql} ORDER BY {order_by} LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt.query_map(
        params_from_iter(conditions.paged_params(page.limit(), page.offset())),
        map,
    )?;
    let items = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((items, total))
}

fn query_tasks(conn: &Connection, sql: &str, id: impl rusqlite::ToSql) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![id], task_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn find_identifier_conflict(
    conn: &Connection,
    entity_type: EntityType,
    identifier: &str,
    exclude_id: Option<i64>,
) -> Result<Option<(i64, String)>> {
    conn.query_row(
        "SELECT id, name FROM entities
         WHERE entity_type = ?1 AND identifier = ?2 AND deleted_at IS NULL
           AND (?3 IS NULL OR id != ?3)
         LIMIT 1",
        params![entity_type, identifier, exclude_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(Error::from)
}

fn check_identifier(conn: &Connection, entity: &Entity, exclude_id: Option<i64>) -> Result<()> {
    let Some(identifier) = entity.identifier.as_deref() else {
        return Ok(());
    };
    match find_identifier_conflict(conn, entity.entity_type, identifier, exclude_id)? {
        Some((existing_id, existing_name)) => Err(Error::Duplicate {
            kind: "entity",
            key: format!("{}:{identifier}", entity.entity_type),
            existing_id,
            existing_name: Some(existing_name),
        }),
        None => Ok(()),
    }
}

fn json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Ids of `root` and every live descendant. `UNION` keeps parent cycles finite.
fn subtree_ids(conn: &Connection, root: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION
             SELECT t.id FROM tasks t
             JOIN subtree s ON t.parent_task_id = s.id
             WHERE t.deleted_at IS NULL
         )
         SELECT id FROM subtree",
    )?;
    let rows = stmt.query_map(params![root], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.db.provision(schema::migrate)?;
        info!(storage = %self.db.label(), "workspace store ready");
        Ok(())
    }

    // Task operations

    fn create_task(&self, task: &Task) -> Result<i64> {
        self.db.write(|conn| {
            if let Some(parent) = task.parent_task_id {
                ensure_parent(conn, parent, None)?;
            }
            conn.execute(
                "INSERT INTO tasks (title, description, status, priority, parent_task_id,
                                    depends_on, blocker_reason, tags, file_references,
                                    created_by, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    task.title,
                    task.description,
                    task.status,
                    task.priority,
                    task.parent_task_id,
                    json_text(&task.depends_on)?,
                    task.blocker_reason,
                    task.tags,
                    json_text(&task.file_references)?,
                    task.created_by,
                    format_datetime(&task.created_at),
                    format_datetime(&task.updated_at),
                    task.completed_at.as_ref().map(format_datetime),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn get_task(&self, id: i64, include_deleted: bool) -> Result<Option<Task>> {
        self.db.read(|conn| select_task(conn, id, include_deleted))
    }

    fn update_task(&self, id: i64, apply: Mutation<'_, Task>) -> Result<Task> {
        self.db.write(|conn| {
            let mut task = select_task(conn, id, false)?.ok_or_else(|| Error::not_found("task", id))?;
            let previous_parent = task.parent_task_id;
            apply(&mut task)?;
            if let Some(parent) = task.parent_task_id.filter(|p| Some(*p) != previous_parent) {
                ensure_parent(conn, parent, Some(id))?;
            }

            conn.execute(
                "UPDATE tasks SET title = ?1, description = ?2, status = ?3, priority = ?4,
                        parent_task_id = ?5, depends_on = ?6, blocker_reason = ?7, tags = ?8,
                        file_references = ?9, updated_at = ?10, completed_at = ?11
                 WHERE id = ?12",
                params![
                    task.title,
                    task.description,
                    task.status,
                    task.priority,
                    task.parent_task_id,
                    json_text(&task.depends_on)?,
                    task.blocker_reason,
                    task.tags,
                    json_text(&task.file_references)?,
                    format_datetime(&task.updated_at),
                    task.completed_at.as_ref().map(format_datetime),
                    id,
                ],
            )?;
            Ok(task)
        })
    }

    fn list_tasks(&self, filter: &TaskFilter, page: Pagination) -> Result<(Vec<Task>, i64)> {
        self.db.read(|conn| {
            select_page(
                conn,
                TASK_COLUMNS,
                "FROM tasks t",
                &filter.conditions(),
                "t.created_at DESC, t.id DESC",
                page,
                task_from_row,
            )
        })
    }

    fn search_tasks(&self, term: &str, page: Pagination) -> Result<(Vec<Task>, i64)> {
        let mut conditions = Conditions::new();
        conditions.push("t.deleted_at IS NULL").push_repeated(
            "(fold(t.title) LIKE ? ESCAPE '\\' \
              OR fold(coalesce(t.description, '')) LIKE ? ESCAPE '\\')",
            like_pattern(term),
            2,
        );
        self.db.read(|conn| {
            select_page(
                conn,
                TASK_COLUMNS,
                "FROM tasks t",
                &conditions,
                "t.created_at DESC, t.id DESC",
                page,
                task_from_row,
            )
        })
    }

    fn list_child_tasks(&self, parent_id: i64) -> Result<Vec<Task>> {
        self.db.read(|conn| {
            query_tasks(
                conn,
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t
                     WHERE t.parent_task_id = ?1 AND t.deleted_at IS NULL
                     ORDER BY t.created_at ASC, t.id ASC"
                ),
                parent_id,
            )
        })
    }

    fn list_tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.db.read(|conn| {
            query_tasks(
                conn,
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t
                     WHERE t.status = ?1 AND t.deleted_at IS NULL
                     ORDER BY t.created_at DESC, t.id DESC"
                ),
                status,
            )
        })
    }

    fn live_task_statuses(&self, ids: &[i64]) -> Result<HashMap<i64, TaskStatus>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.db.read(|conn| {
            let mut statuses = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(ID_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, status FROM tasks
                     WHERE deleted_at IS NULL AND id IN ({placeholders})"
                ))?;
                let rows = stmt.query_map(params_from_iter(chunk), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, TaskStatus>(1)?))
                })?;
                for row in rows {
                    let (id, status) = row?;
                    statuses.insert(id, status);
                }
            }
            Ok(statuses)
        })
    }

    fn delete_task(&self, id: i64, cascade: bool, at: DateTime<Utc>) -> Result<usize> {
        let deleted_at = format_datetime(&at);
        self.db.write(|conn| {
            if !is_live(conn, "tasks", id)? {
                return Err(Error::not_found("task", id));
            }

            let ids = if cascade {
                subtree_ids(conn, id)?
            } else {
                vec![id]
            };

            let mut touched = 0;
            for task_id in &ids {
                touched += conn.execute(
                    "UPDATE tasks SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                    params![deleted_at, task_id],
                )?;
            }
            if cascade {
                for task_id in &ids {
                    touched += conn.execute(
                        "UPDATE task_entity_links SET deleted_at = ?1
                         WHERE task_id = ?2 AND deleted_at IS NULL",
                        params![deleted_at, task_id],
                    )?;
                }
            }

            debug!(task_id = id, cascade, touched, "soft-deleted task");
            Ok(touched)
        })
    }

    // Entity operations

    fn create_entity(&self, entity: &Entity) -> Result<i64> {
        self.db.write(|conn| {
            check_identifier(conn, entity, None)?;
            conn.execute(
                "INSERT INTO entities (entity_type, name, identifier, description, metadata,
                                       tags, created_by, updated_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entity.entity_type,
                    entity.name,
                    entity.identifier,
                    entity.description,
                    entity.metadata,
                    entity.tags,
                    entity.created_by,
                    entity.updated_by,
                    format_datetime(&entity.created_at),
                    format_datetime(&entity.updated_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn get_entity(&self, id: i64, include_deleted: bool) -> Result<Option<Entity>> {
        self.db.read(|conn| select_entity(conn, id, include_deleted))
    }

    fn update_entity(&self, id: i64, apply: Mutation<'_, Entity>) -> Result<Entity> {
        self.db.write(|conn| {
            let mut entity =
                select_entity(conn, id, false)?.ok_or_else(|| Error::not_found("entity", id))?;
            let previous_identifier = entity.identifier.clone();
            apply(&mut entity)?;
            if entity.identifier != previous_identifier {
                check_identifier(conn, &entity, Some(id))?;
            }

            conn.execute(
                "UPDATE entities SET name = ?1, identifier = ?2, description = ?3,
                        metadata = ?4, tags = ?5, updated_by = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    entity.name,
                    entity.identifier,
                    entity.description,
                    entity.metadata,
                    entity.tags,
                    entity.updated_by,
                    format_datetime(&entity.updated_at),
                    id,
                ],
            )?;
            Ok(entity)
        })
    }

    fn list_entities(
        &self,
        filter: &EntityFilter,
        page: Pagination,
    ) -> Result<(Vec<Entity>, i64)> {
        self.db.read(|conn| {
            select_page(
                conn,
                ENTITY_COLUMNS,
                "FROM entities e",
                &filter.conditions(),
                "e.created_at DESC, e.id DESC",
                page,
                entity_from_row,
            )
        })
    }

    fn search_entities(
        &self,
        term: &str,
        entity_type: Option<EntityType>,
        page: Pagination,
    ) -> Result<(Vec<Entity>, i64)> {
        let filter = entity_type.map(EntityFilter::of_type).unwrap_or_default();
        let mut conditions = filter.conditions();
        conditions.push_repeated(
            "(fold(e.name) LIKE ? ESCAPE '\\' \
              OR fold(coalesce(e.identifier, '')) LIKE ? ESCAPE '\\')",
            like_pattern(term),
            2,
        );
        self.db.read(|conn| {
            select_page(
                conn,
                ENTITY_COLUMNS,
                "FROM entities e",
                &conditions,
                "e.created_at DESC, e.id DESC",
                page,
                entity_from_row,
            )
        })
    }

    fn delete_entity(&self, id: i64, at: DateTime<Utc>) -> Result<usize> {
        let deleted_at = format_datetime(&at);
        self.db.write(|conn| {
            if !is_live(conn, "entities", id)? {
                return Err(Error::not_found("entity", id));
            }
            conn.execute(
                "UPDATE entities SET deleted_at = ?1 WHERE id = ?2",
                params![deleted_at, id],
            )?;
            let links = conn.execute(
                "UPDATE task_entity_links SET deleted_at = ?1
                 WHERE entity_id = ?2 AND deleted_at IS NULL",
                params![deleted_at, id],
            )?;

            debug!(entity_id = id, links, "soft-deleted entity");
            Ok(links)
        })
    }

    // Task-entity link operations

    fn create_link(&self, link: &TaskEntityLink) -> Result<TaskEntityLink> {
        self.db.write(|conn| {
            if !is_live(conn, "tasks", link.task_id)? {
                return Err(Error::not_found("task", link.task_id));
            }
            if !is_live(conn, "entities", link.entity_id)? {
                return Err(Error::not_found("entity", link.entity_id));
            }

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM task_entity_links
                     WHERE task_id = ?1 AND entity_id = ?2 AND deleted_at IS NULL",
                    params![link.task_id, link.entity_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing_id) = existing {
                return Err(Error::Duplicate {
                    kind: "link",
                    key: format!("task {} -> entity {}", link.task_id, link.entity_id),
                    existing_id,
                    existing_name: None,
                });
            }

            conn.execute(
                "INSERT INTO task_entity_links (task_id, entity_id, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    link.task_id,
                    link.entity_id,
                    link.created_by,
                    format_datetime(&link.created_at),
                ],
            )?;

            conn.query_row(
                "SELECT id, task_id, entity_id, created_by, created_at, deleted_at
                 FROM task_entity_links WHERE id = ?1",
                params![conn.last_insert_rowid()],
                link_from_row,
            )
            .map_err(Error::from)
        })
    }

    fn delete_link(&self, task_id: i64, entity_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let deleted_at = format_datetime(&at);
        self.db.write(|conn| {
            let rows = conn.execute(
                "UPDATE task_entity_links SET deleted_at = ?1
                 WHERE task_id = ?2 AND entity_id = ?3 AND deleted_at IS NULL",
                params![deleted_at, task_id, entity_id],
            )?;
            Ok(rows > 0)
        })
    }

    fn list_task_entities(
        &self,
        task_id: i64,
        page: Pagination,
    ) -> Result<(Vec<LinkedEntity>, i64)> {
        let mut conditions = Conditions::new();
        conditions
            .push_param("l.task_id = ?", task_id)
            .push("l.deleted_at IS NULL")
            .push("e.deleted_at IS NULL");
        self.db.read(|conn| {
            select_page(
                conn,
                &format!("{ENTITY_COLUMNS}, {LINK_INFO_COLUMNS}"),
                "FROM task_entity_links l JOIN entities e ON e.id = l.entity_id",
                &conditions,
                "l.created_at DESC, l.id DESC",
                page,
                linked_entity_from_row,
            )
        })
    }

    fn list_entity_tasks(
        &self,
        entity_id: i64,
        filter: &TaskFilter,
        page: Pagination,
    ) -> Result<(Vec<LinkedTask>, i64)> {
        let mut conditions = filter.conditions();
        conditions
            .push_param("l.entity_id = ?", entity_id)
            .push("l.deleted_at IS NULL");
        self.db.read(|conn| {
            select_page(
                conn,
                &format!("{TASK_COLUMNS}, {LINK_INFO_COLUMNS}"),
                "FROM task_entity_links l JOIN tasks t ON t.id = l.task_id",
                &conditions,
                "l.created_at DESC, l.id DESC",
                page,
                linked_task_from_row,
            )
        })
    }

    // Maintenance

    fn purge_deleted(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let cutoff = format_datetime(&cutoff);
        let report = self.db.write(|conn| {
            let links = conn.execute(
                "DELETE FROM task_entity_links
                 WHERE (deleted_at IS NOT NULL AND deleted_at < ?1)
                    OR task_id IN (SELECT id FROM tasks
                                   WHERE deleted_at IS NOT NULL AND deleted_at < ?1)
                    OR entity_id IN (SELECT id FROM entities
                                     WHERE deleted_at IS NOT NULL AND deleted_at < ?1)",
                params![cutoff],
            )?;
            let tasks = conn.execute(
                "DELETE FROM tasks WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
                params![cutoff],
            )?;
            let entities = conn.execute(
                "DELETE FROM entities WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
                params![cutoff],
            )?;
            Ok(PurgeReport {
                tasks,
                entities,
                links,
            })
        })?;

        info!(
            storage = %self.db.label(),
            tasks = report.tasks,
            entities = report.entities,
            links = report.links,
            "purged soft-deleted rows"
        );
        Ok(report)
    }

    fn stats(&self) -> Result<WorkspaceStats> {
        self.db.read(|conn| {
            let mut tasks_by_status = BTreeMap::new();
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM tasks WHERE deleted_at IS NULL GROUP BY status",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                tasks_by_status.insert(status, count);
            }

            let count = |sql: &str| -> Result<i64> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };

            Ok(WorkspaceStats {
                tasks_by_status,
                deleted_tasks: count("SELECT COUNT(*) FROM tasks WHERE deleted_at IS NOT NULL")?,
                entities: count("SELECT COUNT(*) FROM entities WHERE deleted_at IS NULL")?,
                deleted_entities: count(
                    "SELECT COUNT(*) FROM entities WHERE deleted_at IS NOT NULL",
                )?,
                links: count(
                    "SELECT COUNT(*) FROM task_entity_links l
                     JOIN tasks t ON t.id = l.task_id AND t.deleted_at IS NULL
                     JOIN entities e ON e.id = l.entity_id AND e.deleted_at IS NULL
                     WHERE l.deleted_at IS NULL",
                )?,
            })
        })
    }
}
