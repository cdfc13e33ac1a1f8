//! Command implementations for the CLI.
//!
//! Every command prints one JSON document on stdout.

pub mod index;
pub mod init;
pub mod query;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::storage::StorageError;

/// What every command needs: settings and the workspace root they apply to.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub settings: Settings,
    pub root: PathBuf,
    pub cwd: PathBuf,
}

impl CommandContext {
    pub fn new(settings: Settings, root: PathBuf, cwd: PathBuf) -> Self {
        Self { settings, root, cwd }
    }

    /// Absolute form of a path given relative to the current directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        crate::paths::resolve_against(path, &self.cwd)
    }
}

/// Pretty-print `value` as JSON on stdout.
pub fn emit<T: Serialize>(value: &T) -> IndexResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| IndexError::Storage(StorageError::Serialization(e.to_string())))?;
    println!("{json}");
    Ok(())
}
