//! Project configuration: the persisted description of how to analyze one
//! project, and the locator mapping directories onto it.

pub mod locator;

pub use locator::ConfigLocator;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::paths;

/// Default name of the per-project configuration file.
pub const CONFIG_FILE_NAME: &str = ".refindex.json";
/// Default name of the record log stored beside the configuration.
pub const LOG_FILE_NAME: &str = ".refindex.idx";

/// External artifact a project depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Repository the artifact is built from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl Dependency {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            file: None,
            repo: None,
        }
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn unit_id(&self) -> String {
        format!("{}/{}", self.group_id, self.artifact_id)
    }
}

/// How to analyze one project. Written once by project preparation and read
/// only afterwards; the path of the file it was loaded from identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub unit: String,
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    /// Compilation files; empty means "walk the source roots"
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub class_path: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    #[serde(skip)]
    file: PathBuf,
}

impl ProjectConfig {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            source_roots: Vec::new(),
            files: Vec::new(),
            class_path: Vec::new(),
            output_dir: None,
            dependencies: Vec::new(),
            file: PathBuf::new(),
        }
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_roots.push(root.into());
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Resolve every path against `workspace_root`, then write the config as
    /// `target_dir/file_name`. Returns the written file.
    pub fn save(
        &mut self,
        workspace_root: &Path,
        target_dir: &Path,
        file_name: &str,
    ) -> IndexResult<PathBuf> {
        let resolve = |p: &PathBuf| paths::resolve_against(p, workspace_root);
        self.source_roots = self.source_roots.iter().map(resolve).collect();
        self.files = self.files.iter().map(resolve).collect();
        self.class_path = self.class_path.iter().map(resolve).collect();
        self.output_dir = self.output_dir.as_ref().map(resolve);
        for dependency in &mut self.dependencies {
            dependency.file = dependency.file.as_ref().map(resolve);
        }

        let target = paths::resolve_against(&target_dir.join(file_name), workspace_root);
        let json = serde_json::to_string_pretty(self).map_err(|e| IndexError::InvalidConfiguration {
            path: target.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&target, json).map_err(|source| IndexError::FileWrite {
            path: target.clone(),
            source,
        })?;

        tracing::info!(target: "workspace", "Wrote project configuration {}", target.display());
        self.file = target.clone();
        Ok(target)
    }

    /// Load the config stored at `file`. `Ok(None)` when there is none.
    pub fn read(file: &Path) -> IndexResult<Option<Self>> {
        if !file.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(file).map_err(|source| IndexError::FileRead {
            path: file.to_path_buf(),
            source,
        })?;
        let mut config: ProjectConfig =
            serde_json::from_str(&content).map_err(|e| IndexError::InvalidConfiguration {
                path: file.to_path_buf(),
                reason: e.to_string(),
            })?;
        config.file = paths::normalize(file);
        Ok(Some(config))
    }

    /// The file this config was loaded from or saved to.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Directory holding the config file.
    pub fn dir(&self) -> &Path {
        self.file.parent().unwrap_or(Path::new(""))
    }

    /// Record log path for this project.
    pub fn log_path(&self, log_file_name: &str) -> PathBuf {
        self.dir().join(log_file_name)
    }

    /// Dependency whose group id is the longest prefix of `qualified_name`.
    pub fn dependency_providing(&self, qualified_name: &str) -> Option<&Dependency> {
        self.dependencies
            .iter()
            .filter(|d| {
                !d.group_id.is_empty()
                    && qualified_name.starts_with(&d.group_id)
                    && matches!(
                        qualified_name.as_bytes().get(d.group_id.len()),
                        None | Some(b'.')
                    )
            })
            .max_by_key(|d| d.group_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_resolves_paths_and_read_restores_identity() {
        let ws = TempDir::new().unwrap();
        let project_dir = ws.path().join("app");
        std::fs::create_dir_all(&project_dir).unwrap();

        let mut config = ProjectConfig::new("com.acme/app").with_source_root("app/./src/main/java");
        config.class_path.push(PathBuf::from("libs/../libs/guava.jar"));
        let file = config.save(ws.path(), Path::new("app"), CONFIG_FILE_NAME).unwrap();

        assert_eq!(file, project_dir.join(CONFIG_FILE_NAME));
        let loaded = ProjectConfig::read(&file).unwrap().unwrap();
        assert_eq!(loaded.file(), file.as_path());
        assert_eq!(loaded.source_roots, vec![ws.path().join("app/src/main/java")]);
        assert_eq!(loaded.class_path, vec![ws.path().join("libs/guava.jar")]);
        assert_eq!(loaded.log_path(LOG_FILE_NAME), project_dir.join(LOG_FILE_NAME));
    }

    #[test]
    fn test_read_absent_and_malformed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(CONFIG_FILE_NAME);
        assert!(ProjectConfig::read(&file).unwrap().is_none());

        std::fs::write(&file, "{ not json").unwrap();
        assert!(matches!(
            ProjectConfig::read(&file),
            Err(IndexError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_dependency_providing_prefers_longest_group() {
        let config = ProjectConfig::new("app")
            .with_dependency(Dependency::new("com.google", "parent", "1"))
            .with_dependency(Dependency::new("com.google.guava", "guava", "33.0").with_repo("github.com/google/guava"));

        let dep = config.dependency_providing("com.google.guava.collect.ImmutableList").unwrap();
        assert_eq!(dep.unit_id(), "com.google.guava/guava");
        assert!(config.dependency_providing("com.googlex.Foo").is_none());
        assert!(config.dependency_providing("org.junit.Test").is_none());
    }
}
