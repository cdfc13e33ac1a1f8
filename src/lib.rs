//! Symbol index and point-query engine for checked-out source trees.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod indexing;
pub mod logging;
pub mod offsets;
pub mod paths;
pub mod project;
pub mod query;
pub mod storage;
pub mod types;
pub mod workspace;

pub use analysis::{AnalysisUnit, JavaAnalyzer, PendingUnit, StaticAnalyzer, SymbolAnalyzer, UnitStream};
pub use cache::{EntryState, Pending, PendingCache, WorkerPool};
pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use indexing::{BuildState, BuildStats, ProjectIndex};
pub use offsets::{LineIndex, OffsetTranslator};
pub use project::{ConfigLocator, Dependency, ProjectConfig};
pub use query::{Answer, Hover, QueryService};
pub use storage::{RecordLog, RecordWriter, StorageError};
pub use types::{DefSpec, ExternalOrigin, FactKind, LineCol, Position, ProjectRef, Range, SymbolFact};
pub use workspace::{
    LocalCheckouts, RepositoryCache, RepositorySource, SingleCheckout, Workspace, WorkspaceRegistry,
};
