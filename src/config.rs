//! Layered settings for the indexing engine.
//!
//! Sources, later ones winning:
//! - Default values
//! - `.refindex/settings.toml` in the nearest enclosing workspace
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RI_` and use double underscores
//! to separate nested levels:
//! - `RI_INDEXING__WORKER_THREADS=8` sets `indexing.worker_threads`
//! - `RI_QUERY__TIMEOUT_MS=1000` sets `query.timeout_ms`
//! - `RI_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the settings file.
pub const SETTINGS_DIR: &str = ".refindex";
pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .refindex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub repositories: RepositoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Size of the background worker pool
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Name of the per-project configuration file
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    /// Name of the record log written next to each project configuration
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryConfig {
    /// How long interactive queries wait for a pending index
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry hint handed back with a not-ready answer
    #[serde(default = "default_retry_after_ms")]
    pub retry_after_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RepositoryConfig {
    /// Base directory of local checkouts, laid out as `<repo>/<revision>`
    #[serde(default = "default_repositories_dir")]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `index = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_worker_threads() -> usize {
    crate::cache::pool::default_threads()
}
fn default_config_file_name() -> String {
    crate::project::CONFIG_FILE_NAME.to_string()
}
fn default_log_file_name() -> String {
    crate::project::LOG_FILE_NAME.to_string()
}
fn default_timeout_ms() -> u64 {
    250
}
fn default_retry_after_ms() -> u64 {
    1000
}
fn default_repositories_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_DIR)
        .join("workspace")
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            indexing: IndexingConfig::default(),
            query: QueryConfig::default(),
            repositories: RepositoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            config_file_name: default_config_file_name(),
            log_file_name: default_log_file_name(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_after_ms: default_retry_after_ms(),
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_dir: default_repositories_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(SETTINGS_DIR).join(SETTINGS_FILE));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("RI_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for a .refindex directory from the
    /// current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where .refindex is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(SETTINGS_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.indexing.worker_threads > 0);
        assert_eq!(settings.indexing.config_file_name, ".refindex.json");
        assert_eq!(settings.query.timeout(), Duration::from_millis(250));
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[indexing]
worker_threads = 3

[query]
timeout_ms = 50

[repositories]
base_dir = "/srv/checkouts"

[logging.modules]
index = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.indexing.worker_threads, 3);
        assert_eq!(settings.query.timeout_ms, 50);
        assert_eq!(settings.repositories.base_dir, PathBuf::from("/srv/checkouts"));
        assert_eq!(settings.logging.modules["index"], "debug");
        // untouched values keep their defaults
        assert_eq!(settings.query.retry_after_ms, 1000);
        assert_eq!(settings.indexing.log_file_name, ".refindex.idx");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(SETTINGS_DIR).join(SETTINGS_FILE);

        let mut settings = Settings::default();
        settings.indexing.worker_threads = 2;
        settings.query.timeout_ms = 900;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.indexing.worker_threads, 2);
        assert_eq!(loaded.query.timeout_ms, 900);
    }
}
