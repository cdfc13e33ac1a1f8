//! Path utilities shared by config loading, indexing and queries.
//!
//! Everything here is lexical: no symlink resolution and no filesystem access,
//! so results stay stable for paths that do not exist yet.

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `base` when it is relative.
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    if path.is_relative() {
        normalize(&base.join(path))
    } else {
        normalize(path)
    }
}

/// Remove `.` segments and fold `..` into the preceding segment.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Workspace-relative, `/`-separated form of `path`, or `None` when `path`
/// lies outside `root`.
pub fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let path = normalize(path);
    let root = normalize(root);
    let rel = path.strip_prefix(&root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Whether `path` lies inside `root` (or is `root` itself).
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}
