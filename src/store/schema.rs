use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub const TABLES: &str = r#"
-- Units of work
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'todo',
    priority TEXT NOT NULL DEFAULT 'medium',

    -- Hierarchy; not checked for cycles
    parent_task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,

    -- JSON array of task ids that must be done first
    depends_on TEXT NOT NULL DEFAULT '[]',
    blocker_reason TEXT,
    tags TEXT,
    file_references TEXT NOT NULL DEFAULT '[]',

    created_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    deleted_at TEXT            -- NULL = live
);

-- Domain artifacts (files, external references)
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    name TEXT NOT NULL,
    identifier TEXT,           -- NULL never collides
    description TEXT,
    metadata BLOB,             -- opaque, stored verbatim
    tags TEXT,
    created_by TEXT,
    updated_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Many-to-many between tasks and entities
CREATE TABLE IF NOT EXISTS task_entity_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    created_by TEXT,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);
"#;

/// Created after column migration so every referenced column exists.
pub const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id);
CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks(created_at);
CREATE INDEX IF NOT EXISTS idx_tasks_deleted ON tasks(deleted_at) WHERE deleted_at IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_entities_deleted ON entities(deleted_at) WHERE deleted_at IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_live_identifier
    ON entities(entity_type, identifier)
    WHERE identifier IS NOT NULL AND deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_links_live_pair
    ON task_entity_links(task_id, entity_id)
    WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_links_entity ON task_entity_links(entity_id);
"#;

/// Columns added after the first release. Stores created before a column
/// existed get it on open; declarations must carry a default or allow NULL.
pub const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("tasks", "blocker_reason", "TEXT"),
    ("tasks", "tags", "TEXT"),
    ("tasks", "file_references", "TEXT NOT NULL DEFAULT '[]'"),
    ("tasks", "created_by", "TEXT"),
    ("tasks", "completed_at", "TEXT"),
    ("tasks", "deleted_at", "TEXT"),
    ("entities", "identifier", "TEXT"),
    ("entities", "metadata", "BLOB"),
    ("entities", "tags", "TEXT"),
    ("entities", "created_by", "TEXT"),
    ("entities", "updated_by", "TEXT"),
    ("entities", "deleted_at", "TEXT"),
    ("task_entity_links", "created_by", "TEXT"),
    ("task_entity_links", "deleted_at", "TEXT"),
];

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Adds any missing column from `columns`. Never drops or rewrites data.
/// Returns the number of columns added.
pub fn add_missing_columns(conn: &Connection, columns: &[(&str, &str, &str)]) -> Result<usize> {
    let mut added = 0;
    for (table, column, decl) in columns {
        let existing = table_columns(conn, table)?;
        if existing.iter().any(|c| c == column) {
            continue;
        }
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
        info!(table, column, "added missing column");
        added += 1;
    }
    Ok(added)
}

/// Brings a workspace store up to the current schema. Idempotent.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(TABLES)?;
    add_missing_columns(conn, ADDITIVE_COLUMNS)?;
    conn.execute_batch(INDEXES)?;
    Ok(())
}
