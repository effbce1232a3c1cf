use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

pub const WORKSPACE_ENV: &str = "TASKMILL_WORKSPACE";

/// Hex characters of the path digest kept as the storage identifier.
pub const STORAGE_ID_LEN: usize = 16;

/// A canonical workspace path and the storage identifier derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkspaceId {
    pub path: PathBuf,
    pub storage_identifier: String,
}

impl WorkspaceId {
    /// Canonicalizes `path` (joined onto the current directory when relative).
    pub fn from_path(path: &Path) -> Result<Self> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let path = canonicalize(&absolute);
        let storage_identifier = storage_identifier(&path);
        Ok(Self {
            path,
            storage_identifier,
        })
    }

    /// Lossy for non-UTF-8 paths; key lookups by `storage_identifier`.
    #[must_use]
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Picks the workspace path: explicit, then environment, then `cwd`.
pub fn resolve(explicit: Option<&Path>, env: Option<&str>, cwd: &Path) -> Result<WorkspaceId> {
    let chosen = explicit
        .map(Path::to_path_buf)
        .or_else(|| {
            env.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| cwd.to_path_buf());

    if chosen.is_absolute() {
        WorkspaceId::from_path(&chosen)
    } else {
        WorkspaceId::from_path(&cwd.join(chosen))
    }
}

/// Like [`resolve`], reading the environment and current directory.
pub fn resolve_current(explicit: Option<&Path>) -> Result<WorkspaceId> {
    let env = std::env::var(WORKSPACE_ENV).ok();
    let cwd = std::env::current_dir()?;
    resolve(explicit, env.as_deref(), &cwd)
}

/// Filesystem canonicalization, falling back to lexical normalization for
/// paths that do not exist yet.
fn canonicalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Digest of the raw path bytes, so distinct non-UTF-8 paths stay distinct.
pub fn storage_identifier(canonical: &Path) -> String {
    let digest = Sha256::digest(canonical.as_os_str().as_encoded_bytes());
    let mut id = hex::encode(digest);
    id.truncate(STORAGE_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_beats_env_and_cwd() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("explicit");
        let env = temp.path().join("env");
        fs::create_dir_all(&explicit).unwrap();
        fs::create_dir_all(&env).unwrap();

        let id = resolve(Some(&explicit), env.to_str(), temp.path()).unwrap();
        assert_eq!(id.path, fs::canonicalize(&explicit).unwrap());

        let id = resolve(None, env.to_str(), temp.path()).unwrap();
        assert_eq!(id.path, fs::canonicalize(&env).unwrap());

        let id = resolve(None, Some("  "), temp.path()).unwrap();
        assert_eq!(id.path, fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn test_relative_path_joins_cwd() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("proj")).unwrap();

        let id = resolve(Some(Path::new("./proj/../proj")), None, temp.path()).unwrap();
        assert_eq!(id.path, fs::canonicalize(temp.path().join("proj")).unwrap());
    }

    #[test]
    fn test_missing_path_is_normalized_lexically() {
        let id = WorkspaceId::from_path(Path::new("/no/such/dir/./a/../b")).unwrap();
        assert_eq!(id.path, PathBuf::from("/no/such/dir/b"));
    }

    #[test]
    fn test_storage_identifier_is_stable() {
        let a = storage_identifier(Path::new("/home/dev/project"));
        let b = storage_identifier(Path::new("/home/dev/project"));
        let c = storage_identifier(Path::new("/home/dev/other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), STORAGE_ID_LEN);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_symlink_resolves_to_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("real");
        fs::create_dir_all(&target).unwrap();
        let link = temp.path().join("alias");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, &link).unwrap();
            let via_link = WorkspaceId::from_path(&link).unwrap();
            let direct = WorkspaceId::from_path(&target).unwrap();
            assert_eq!(via_link, direct);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_get_distinct_identifiers() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let a = Path::new(OsStr::from_bytes(b"/projects/caf\xe9"));
        let b = Path::new(OsStr::from_bytes(b"/projects/caf\xff"));
        assert_eq!(a.to_string_lossy(), b.to_string_lossy());
        assert_ne!(storage_identifier(a), storage_identifier(b));
    }
}
