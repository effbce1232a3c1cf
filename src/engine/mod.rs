//! Public entry point. A [`Tracker`] owns the configuration, the shared
//! registry, and the pool of per-workspace stores; a [`Workspace`] is the
//! handle every task, entity and link operation runs against.

mod entities;
mod links;
mod maintenance;
mod tasks;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::store::Store;
use crate::types::RegistryEntry;
use crate::workspace::{Registry, WorkspaceId, WorkspacePool, resolve_current};

pub struct Tracker {
    config: EngineConfig,
    registry: Arc<Registry>,
    pool: WorkspacePool,
}

impl Tracker {
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(Registry::new(config.clone())),
            pool: WorkspacePool::new(config.clone()),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves the workspace from `explicit`, then `TASKMILL_WORKSPACE`,
    /// then the current directory, and opens its store.
    pub fn workspace(&self, explicit: Option<&Path>) -> Result<Workspace> {
        self.open_workspace(resolve_current(explicit)?)
    }

    /// Opens the workspace rooted at `path`, ignoring the environment.
    pub fn workspace_at(&self, path: &Path) -> Result<Workspace> {
        self.open_workspace(WorkspaceId::from_path(path)?)
    }

    fn open_workspace(&self, id: WorkspaceId) -> Result<Workspace> {
        let store: Arc<dyn Store> = self.pool.get(&id)?;
        Ok(Workspace {
            id,
            store,
            registry: Arc::clone(&self.registry),
            retention_days: self.config.retention_days,
        })
    }

    // Registry operations

    pub fn list_workspaces(&self) -> Result<Vec<RegistryEntry>> {
        self.registry.list()
    }

    pub fn get_workspace(&self, path: &Path) -> Result<RegistryEntry> {
        self.registry.get(path)
    }

    pub fn set_workspace_name(&self, path: &Path, name: &str) -> Result<RegistryEntry> {
        self.registry.set_name(path, name)
    }

    pub fn forget_workspace(&self, path: &Path) -> Result<bool> {
        self.registry.forget(path)
    }
}

/// One resolved workspace. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Workspace {
    id: WorkspaceId,
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    retention_days: i64,
}

impl Workspace {
    #[must_use]
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.id.path
    }

    /// Records the access in the registry. Failures are logged only.
    fn touch(&self) {
        if let Err(e) = self.registry.register(&self.id) {
            warn!(workspace = %self.id.path.display(), "registry update failed: {e}");
        }
    }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `now`, nudged forward so a row's `updated_at` strictly increases.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    now().max(previous + Duration::microseconds(1))
}
