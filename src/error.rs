//! Crate-wide error type.
//!
//! "Not ready yet" and "nothing there" are not errors; they are carried by
//! [`crate::query::Answer`]. Everything here means the request cannot succeed
//! as issued.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No project configuration found for {path}")]
    ConfigurationMissing { path: PathBuf },

    #[error("Invalid project configuration {path}: {reason}")]
    InvalidConfiguration { path: PathBuf, reason: String },

    #[error("Analysis failed for {unit}: {reason}")]
    Analysis { unit: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is outside of workspace {root}")]
    OutsideWorkspace { path: PathBuf, root: PathBuf },

    #[error("Source file {path} does not exist")]
    FileNotFound { path: PathBuf },

    #[error("Repository {repo}@{revision} is unavailable: {reason}")]
    Repository {
        repo: String,
        revision: String,
        reason: String,
    },

    #[error("Background computation panicked: {0}")]
    Panicked(String),

    #[error("Worker pool error: {0}")]
    Executor(String),

    /// A failure recorded on a cache entry, surfaced again to a later waiter.
    #[error("{0}")]
    Cached(Arc<IndexError>),
}

impl IndexError {
    /// The failure behind any number of `Cached` wrappers.
    pub fn root_cause(&self) -> &IndexError {
        match self {
            IndexError::Cached(inner) => inner.root_cause(),
            other => other,
        }
    }

    pub fn is_configuration_missing(&self) -> bool {
        matches!(self.root_cause(), IndexError::ConfigurationMissing { .. })
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_cached_failures() {
        let inner = Arc::new(IndexError::Analysis {
            unit: "Foo.java".to_string(),
            reason: "boom".to_string(),
        });
        let outer = IndexError::Cached(Arc::new(IndexError::Cached(inner)));

        assert!(matches!(outer.root_cause(), IndexError::Analysis { .. }));
        assert_eq!(outer.to_string(), "Analysis failed for Foo.java: boom");
    }

    #[test]
    fn test_configuration_missing_is_detected_through_cache() {
        let err = IndexError::Cached(Arc::new(IndexError::ConfigurationMissing {
            path: PathBuf::from("/ws/src"),
        }));
        assert!(err.is_configuration_missing());
    }
}
