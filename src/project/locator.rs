//! Nearest enclosing project configuration for a directory.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::ProjectConfig;
use crate::paths;

/// Finds project configurations under one workspace root.
///
/// Every visited directory is memoized, including "no configuration here", so
/// files of the same project only hit the filesystem once.
#[derive(Debug)]
pub struct ConfigLocator {
    root: PathBuf,
    file_name: String,
    memo: DashMap<PathBuf, Option<Arc<ProjectConfig>>>,
}

impl ConfigLocator {
    pub fn new(root: impl AsRef<Path>, file_name: impl Into<String>) -> Self {
        Self {
            root: paths::normalize(root.as_ref()),
            file_name: file_name.into(),
            memo: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration governing `directory`: the one in `directory` itself or
    /// in its nearest ancestor, never looking above the workspace root.
    pub fn find(&self, directory: &Path) -> Option<Arc<ProjectConfig>> {
        let directory = paths::normalize(directory);
        if !directory.starts_with(&self.root) {
            return None;
        }
        self.find_within(&directory)
    }

    fn find_within(&self, directory: &Path) -> Option<Arc<ProjectConfig>> {
        if let Some(hit) = self.memo.get(directory) {
            return hit.value().clone();
        }

        let found = match self.read_config(directory) {
            Some(config) => Some(config),
            None if directory != self.root => directory
                .parent()
                .and_then(|parent| self.find_within(parent)),
            None => None,
        };

        self.memo.insert(directory.to_path_buf(), found.clone());
        found
    }

    fn read_config(&self, directory: &Path) -> Option<Arc<ProjectConfig>> {
        let file = directory.join(&self.file_name);
        match ProjectConfig::read(&file) {
            Ok(config) => config.map(Arc::new),
            Err(e) => {
                tracing::warn!(target: "workspace", "Ignoring project configuration: {e}");
                None
            }
        }
    }

    /// Every readable configuration under the root.
    pub fn discover(&self) -> Vec<Arc<ProjectConfig>> {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == self.file_name.as_str())
            .filter_map(|entry| entry.path().parent().and_then(|dir| self.find(dir)))
            .collect()
    }

    /// Forget every memoized lookup.
    pub fn invalidate(&self) {
        self.memo.clear();
    }

    /// Number of memoized directories.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::CONFIG_FILE_NAME;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(ws: &Path, dir: &str, unit: &str) {
        let target = ws.join(dir);
        fs::create_dir_all(&target).unwrap();
        ProjectConfig::new(unit)
            .save(ws, &target, CONFIG_FILE_NAME)
            .unwrap();
    }

    #[test]
    fn test_finds_nearest_enclosing_config() {
        let ws = TempDir::new().unwrap();
        write_config(ws.path(), "", "root");
        write_config(ws.path(), "lib", "lib");
        fs::create_dir_all(ws.path().join("lib/src/main/java/a")).unwrap();
        fs::create_dir_all(ws.path().join("tools/bin")).unwrap();

        let locator = ConfigLocator::new(ws.path(), CONFIG_FILE_NAME);
        let lib = locator.find(&ws.path().join("lib/src/main/java/a")).unwrap();
        assert_eq!(lib.unit, "lib");
        let root = locator.find(&ws.path().join("tools/bin")).unwrap();
        assert_eq!(root.unit, "root");
    }

    #[test]
    fn test_absence_is_memoized_and_root_bounds_the_climb() {
        let outer = TempDir::new().unwrap();
        write_config(outer.path(), "", "outside");
        let root = outer.path().join("ws");
        fs::create_dir_all(root.join("a/b")).unwrap();

        let locator = ConfigLocator::new(&root, CONFIG_FILE_NAME);
        assert!(locator.find(&root.join("a/b")).is_none());
        // a/b, a and the root itself
        assert_eq!(locator.memoized(), 3);

        assert!(locator.find(outer.path()).is_none());
        assert_eq!(locator.memoized(), 3, "directories outside the root are never visited");
    }

    #[test]
    fn test_invalidate_sees_new_configs() {
        let ws = TempDir::new().unwrap();
        let locator = ConfigLocator::new(ws.path(), CONFIG_FILE_NAME);
        assert!(locator.find(ws.path()).is_none());

        write_config(ws.path(), "", "late");
        assert!(locator.find(ws.path()).is_none(), "memoized absence");

        locator.invalidate();
        assert_eq!(locator.find(ws.path()).unwrap().unit, "late");
    }

    #[test]
    fn test_malformed_config_is_treated_as_absent() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join(CONFIG_FILE_NAME), "[]").unwrap();
        let locator = ConfigLocator::new(ws.path(), CONFIG_FILE_NAME);
        assert!(locator.find(ws.path()).is_none());
    }

    #[test]
    fn test_discover_lists_every_project() {
        let ws = TempDir::new().unwrap();
        write_config(ws.path(), "a", "a");
        write_config(ws.path(), "b/c", "c");

        let locator = ConfigLocator::new(ws.path(), CONFIG_FILE_NAME);
        let mut units: Vec<_> = locator.discover().iter().map(|c| c.unit.clone()).collect();
        units.sort();
        assert_eq!(units, vec!["a".to_string(), "c".to_string()]);
    }
}
