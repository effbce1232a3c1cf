use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::resolver::WorkspaceId;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::store::{RetryPolicy, SqliteStore};

/// Hands out one shared store per workspace, keyed by storage identifier.
/// Only successful opens are cached. The map lock is never held while a
/// store is being opened, so a slow or locked workspace cannot stall
/// callers of another one.
pub struct WorkspacePool {
    config: EngineConfig,
    stores: Mutex<HashMap<String, Arc<SqliteStore>>>,
}

impl WorkspacePool {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, workspace: &WorkspaceId) -> Result<Arc<SqliteStore>> {
        if let Some(store) = self.stores().get(&workspace.storage_identifier) {
            return Ok(Arc::clone(store));
        }

        let opened = Arc::new(self.open(workspace).inspect_err(|e| {
            warn!(workspace = %workspace.path.display(), "failed to open store: {e}");
        })?);
        // a concurrent caller may have opened the same store meanwhile
        let mut stores = self.stores();
        let store = stores
            .entry(workspace.storage_identifier.clone())
            .or_insert(opened);
        Ok(Arc::clone(store))
    }

    fn stores(&self) -> MutexGuard<'_, HashMap<String, Arc<SqliteStore>>> {
        self.stores.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, workspace: &WorkspaceId) -> Result<SqliteStore> {
        let dir = self.config.workspaces_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::Unavailable {
            storage: workspace.storage_identifier.clone(),
            reason: format!("cannot create {}: {e}", dir.display()),
        })?;

        let path = self.config.workspace_db_path(&workspace.storage_identifier);
        debug!(workspace = %workspace.path.display(), path = %path.display(), "opening store");
        SqliteStore::open(
            &path,
            &workspace.storage_identifier,
            self.config.busy_timeout,
            RetryPolicy::from_config(&self.config),
        )
    }

    /// Number of stores currently held open.
    pub fn len(&self) -> usize {
        self.stores().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
