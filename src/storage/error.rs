use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record at {path}:{line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to publish record log {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Record log {0} has no parent directory")]
    NoParentDirectory(PathBuf),
}

pub type StorageResult<T> = Result<T, StorageError>;
