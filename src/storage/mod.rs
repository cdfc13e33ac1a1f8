pub mod error;
pub mod record_log;

pub use error::{StorageError, StorageResult};
pub use record_log::{RecordLog, RecordScan, RecordWriter};
