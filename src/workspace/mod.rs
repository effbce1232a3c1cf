mod pool;
mod registry;
mod resolver;

pub use pool::WorkspacePool;
pub use registry::Registry;
pub use resolver::{
    STORAGE_ID_LEN, WORKSPACE_ENV, WorkspaceId, resolve, resolve_current, storage_identifier,
};
