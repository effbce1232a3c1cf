use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::types::*;

pub const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.status, t.priority, \
     t.parent_task_id, t.depends_on, t.blocker_reason, t.tags, t.file_references, \
     t.created_by, t.created_at, t.updated_at, t.completed_at, t.deleted_at";
const TASK_COLUMN_COUNT: usize = 15;

pub const ENTITY_COLUMNS: &str = "e.id, e.entity_type, e.name, e.identifier, e.description, \
     e.metadata, e.tags, e.created_by, e.updated_by, e.created_at, e.updated_at, e.deleted_at";
const ENTITY_COLUMN_COUNT: usize = 12;

pub const LINK_INFO_COLUMNS: &str = "l.id, l.created_at, l.created_by";

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime('now') format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn get_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(parse_datetime(&row.get::<_, String>(idx)?))
}

fn get_optional_datetime(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .map(|s| parse_datetime(&s)))
}

fn get_json<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        priority: row.get(4)?,
        parent_task_id: row.get(5)?,
        depends_on: get_json(row, 6)?,
        blocker_reason: row.get(7)?,
        tags: row.get(8)?,
        file_references: get_json(row, 9)?,
        created_by: row.get(10)?,
        created_at: get_datetime(row, 11)?,
        updated_at: get_datetime(row, 12)?,
        completed_at: get_optional_datetime(row, 13)?,
        deleted_at: get_optional_datetime(row, 14)?,
    })
}

pub fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        name: row.get(2)?,
        identifier: row.get(3)?,
        description: row.get(4)?,
        metadata: row.get(5)?,
        tags: row.get(6)?,
        created_by: row.get(7)?,
        updated_by: row.get(8)?,
        created_at: get_datetime(row, 9)?,
        updated_at: get_datetime(row, 10)?,
        deleted_at: get_optional_datetime(row, 11)?,
    })
}

fn link_info_from_row(row: &Row, base: usize) -> rusqlite::Result<LinkInfo> {
    Ok(LinkInfo {
        link_id: row.get(base)?,
        linked_at: get_datetime(row, base + 1)?,
        linked_by: row.get(base + 2)?,
    })
}

/// Expects `TASK_COLUMNS` followed by `LINK_INFO_COLUMNS`.
pub fn linked_task_from_row(row: &Row) -> rusqlite::Result<LinkedTask> {
    Ok(LinkedTask {
        task: task_from_row(row)?,
        link: link_info_from_row(row, TASK_COLUMN_COUNT)?,
    })
}

/// Expects `ENTITY_COLUMNS` followed by `LINK_INFO_COLUMNS`.
pub fn linked_entity_from_row(row: &Row) -> rusqlite::Result<LinkedEntity> {
    Ok(LinkedEntity {
        entity: entity_from_row(row)?,
        link: link_info_from_row(row, ENTITY_COLUMN_COUNT)?,
    })
}

pub fn link_from_row(row: &Row) -> rusqlite::Result<TaskEntityLink> {
    Ok(TaskEntityLink {
        id: row.get(0)?,
        task_id: row.get(1)?,
        entity_id: row.get(2)?,
        created_by: row.get(3)?,
        created_at: get_datetime(row, 4)?,
        deleted_at: get_optional_datetime(row, 5)?,
    })
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_sql!(TaskStatus);
text_enum_sql!(Priority);
text_enum_sql!(EntityType);

impl ToSql for Metadata {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_bytes()))
    }
}

impl FromSql for Metadata {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Blob(bytes) => Ok(Metadata::new(bytes)),
            // stores written by older releases kept metadata as JSON text
            ValueRef::Text(bytes) => Ok(Metadata::new(bytes)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}
