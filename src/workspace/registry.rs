use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::resolver::WorkspaceId;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::store::rows::{format_datetime, parse_datetime};
use crate::store::{Database, RetryPolicy};
use crate::types::RegistryEntry;
use crate::validation::validate_name;

const REGISTRY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workspaces (
    storage_identifier TEXT PRIMARY KEY,
    workspace_path TEXT NOT NULL,       -- lossy display form
    friendly_name TEXT,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workspaces_accessed ON workspaces(last_accessed_at);
"#;

const ENTRY_COLUMNS: &str =
    "workspace_path, friendly_name, storage_identifier, created_at, last_accessed_at";

/// Shared catalog of every workspace this data dir has served. The file is
/// opened on first use; a failed open is retried on the next call.
pub struct Registry {
    config: EngineConfig,
    db: Mutex<Option<Arc<Database>>>,
}

impl Registry {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            db: Mutex::new(None),
        }
    }

    fn db(&self) -> Result<Arc<Database>> {
        let mut slot = self.db.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(db) = slot.as_ref() {
            return Ok(Arc::clone(db));
        }

        std::fs::create_dir_all(&self.config.data_dir).map_err(|e| Error::Unavailable {
            storage: "registry".to_string(),
            reason: e.to_string(),
        })?;
        let db = Database::open(
            self.config.registry_path(),
            "registry",
            self.config.busy_timeout,
            RetryPolicy::from_config(&self.config),
        )?;
        db.provision(|conn| {
            conn.execute_batch(REGISTRY_SCHEMA)?;
            Ok(())
        })?;
        info!(path = %self.config.registry_path().display(), "registry ready");

        let db = Arc::new(db);
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }

    /// Inserts the workspace or advances its `last_accessed_at`.
    pub fn register(&self, workspace: &WorkspaceId) -> Result<RegistryEntry> {
        let now = format_datetime(&Utc::now());
        let key = &workspace.storage_identifier;
        self.db()?.write(|conn| {
            conn.execute(
                "INSERT INTO workspaces
                    (storage_identifier, workspace_path, created_at, last_accessed_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(storage_identifier)
                 DO UPDATE SET last_accessed_at = excluded.last_accessed_at",
                params![key, workspace.display_path(), now],
            )?;
            select_entry(conn, key)?
                .ok_or_else(|| Error::not_found("workspace", workspace.display_path()))
        })
    }

    /// Every known workspace, most recently used first.
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        self.db()?.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM workspaces
                 ORDER BY last_accessed_at DESC, workspace_path ASC"
            ))?;
            let rows = stmt.query_map([], entry_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }

    pub fn get(&self, path: &Path) -> Result<RegistryEntry> {
        let id = WorkspaceId::from_path(path)?;
        self.db()?
            .read(|conn| select_entry(conn, &id.storage_identifier))?
            .ok_or_else(|| Error::not_found("workspace", id.display_path()))
    }

    /// Sets or clears (blank `name`) the friendly name of a registered workspace.
    pub fn set_name(&self, path: &Path, name: &str) -> Result<RegistryEntry> {
        let name = if name.trim().is_empty() {
            None
        } else {
            Some(validate_name(name)?)
        };
        let id = WorkspaceId::from_path(path)?;
        let missing = || Error::not_found("workspace", id.display_path());

        self.db()?.write(|conn| {
            let updated = conn.execute(
                "UPDATE workspaces SET friendly_name = ?1 WHERE storage_identifier = ?2",
                params![name, id.storage_identifier],
            )?;
            if updated == 0 {
                return Err(missing());
            }
            debug!(workspace = %id.path.display(), name = ?name, "renamed workspace");
            select_entry(conn, &id.storage_identifier)?.ok_or_else(missing)
        })
    }

    /// Drops the catalog row. The workspace's own store file is left alone.
    pub fn forget(&self, path: &Path) -> Result<bool> {
        let id = WorkspaceId::from_path(path)?;
        let removed = self.db()?.write(|conn| {
            Ok(conn.execute(
                "DELETE FROM workspaces WHERE storage_identifier = ?1",
                params![id.storage_identifier],
            )?)
        })?;
        if removed > 0 {
            info!(workspace = %id.path.display(), "forgot workspace");
        }
        Ok(removed > 0)
    }
}

fn select_entry(conn: &Connection, storage_identifier: &str) -> Result<Option<RegistryEntry>> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM workspaces WHERE storage_identifier = ?1"),
        params![storage_identifier],
        entry_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn entry_from_row(row: &Row) -> rusqlite::Result<RegistryEntry> {
    Ok(RegistryEntry {
        workspace_path: row.get(0)?,
        friendly_name: row.get(1)?,
        storage_identifier: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        last_accessed_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}
