//! Point and whole-tree queries over the workspaces of checked-out
//! repositories.
//!
//! Interactive queries (hover, definition, local refs, def-spec mapping) share
//! one deadline of `query.timeout_ms` across every handle they wait on. When
//! the deadline passes first they answer [`Answer::NotReady`]; the background
//! work keeps running so a later retry finds it done.

use indexmap::IndexSet;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{Pending, WorkerPool};
use crate::config::{QueryConfig, Settings};
use crate::error::{IndexError, IndexResult};
use crate::indexing::ProjectIndex;
use crate::offsets::OffsetTranslator;
use crate::paths;
use crate::types::{DefSpec, Position, ProjectRef, Range, SymbolFact};
use crate::workspace::{self, LocalCheckouts, RepositoryCache, Workspace, WorkspaceRegistry};

/// Outcome of a query that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Answer<T> {
    Ready(T),
    /// Repository or index still being prepared
    NotReady { retry_after: Duration },
    /// Nothing matches
    NotFound,
}

impl<T> Answer<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Answer::Ready(_))
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Answer::NotReady { .. })
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Answer::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Answer<U> {
        match self {
            Answer::Ready(value) => Answer::Ready(f(value)),
            Answer::NotReady { retry_after } => Answer::NotReady { retry_after },
            Answer::NotFound => Answer::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hover {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Unwrap a ready answer, or return any other answer as is.
macro_rules! try_ready {
    ($answer:expr) => {
        match $answer {
            Answer::Ready(value) => value,
            Answer::NotReady { retry_after } => return Ok(Answer::NotReady { retry_after }),
            Answer::NotFound => return Ok(Answer::NotFound),
        }
    };
}

/// Wait for `$pending` until `$deadline`, or answer `NotReady`.
macro_rules! ready_or_return {
    ($service:expr, $pending:expr, $deadline:expr) => {
        match $pending.wait_timeout($deadline.saturating_duration_since(Instant::now())) {
            Some(result) => result?,
            None => return Ok($service.not_ready()),
        }
    };
}

/// The symbol under a cursor, with the index it came from.
struct Located {
    index: Arc<ProjectIndex>,
    symbol: SymbolFact,
}

pub struct QueryService {
    registry: Arc<WorkspaceRegistry>,
    repositories: RepositoryCache,
    translator: OffsetTranslator,
    timeout: Duration,
    retry_after: Duration,
}

impl QueryService {
    pub fn new(registry: Arc<WorkspaceRegistry>, repositories: RepositoryCache, config: &QueryConfig) -> Self {
        Self {
            registry,
            repositories,
            translator: OffsetTranslator::new(),
            timeout: config.timeout(),
            retry_after: config.retry_after(),
        }
    }

    /// Service over Java workspaces checked out under
    /// `settings.repositories.base_dir`.
    pub fn from_settings(settings: &Settings) -> IndexResult<Self> {
        let pool = Arc::new(WorkerPool::new(settings.indexing.worker_threads)?);
        let registry = Arc::new(WorkspaceRegistry::java(settings.indexing.clone(), Arc::clone(&pool)));
        let repositories = RepositoryCache::new(
            Arc::new(LocalCheckouts::new(&settings.repositories.base_dir)),
            pool,
        );
        Ok(Self::new(registry, repositories, &settings.query))
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    fn not_ready<T>(&self) -> Answer<T> {
        Answer::NotReady {
            retry_after: self.retry_after,
        }
    }

    fn workspace_within(&self, project: &ProjectRef, deadline: Instant) -> IndexResult<Answer<Arc<Workspace>>> {
        let pending = self.repositories.root_for(project);
        let root = ready_or_return!(self, pending, deadline);
        Ok(Answer::Ready(self.registry.get(root)))
    }

    /// Resolve the source file of `position` and check that it exists
    /// inside the workspace.
    fn source_file(&self, workspace: &Workspace, position: &Position) -> IndexResult<PathBuf> {
        let file = workspace.resolve(&position.file);
        if !paths::is_within(&file, workspace.root()) {
            return Err(IndexError::OutsideWorkspace {
                path: file,
                root: workspace.root().to_path_buf(),
            });
        }
        if !file.is_file() {
            return Err(IndexError::FileNotFound { path: file });
        }
        Ok(file)
    }

    fn locate(&self, position: &Position) -> IndexResult<Answer<Located>> {
        let deadline = Instant::now() + self.timeout;
        let workspace = try_ready!(self.workspace_within(&position.project, deadline)?);

        let file = self.source_file(&workspace, position)?;
        let pending: Pending<Arc<ProjectIndex>> = workspace.find_index_for(&file)?;
        let index = ready_or_return!(self, pending, deadline);

        let at = self.translator.clamp(&file, position.at())?;
        let relative = paths::relative_to(&file, workspace.root()).unwrap_or_else(|| position.file.clone());
        match index.symbol_at(&relative, at)? {
            Some(symbol) => Ok(Answer::Ready(Located { index, symbol })),
            None => Ok(Answer::NotFound),
        }
    }

    /// Declaration of the symbol under the cursor.
    pub fn definition(&self, position: &Position) -> IndexResult<Answer<SymbolFact>> {
        tracing::debug!(target: "query", "Definition {}/{} {}", position.project, position.file, position.at());
        let located = try_ready!(self.locate(position)?);
        if located.symbol.is_def() {
            return Ok(Answer::Ready(located.symbol));
        }
        Ok(match located.index.resolve_definition(&located.symbol.key)? {
            Some(definition) => Answer::Ready(definition),
            None => Answer::NotFound,
        })
    }

    pub fn hover(&self, position: &Position) -> IndexResult<Answer<Hover>> {
        tracing::debug!(target: "query", "Hover {}/{} {}", position.project, position.file, position.at());
        Ok(self.definition(position)?.map(|definition| Hover {
            title: definition.title.unwrap_or(definition.key),
            doc: definition.doc,
        }))
    }

    /// Every occurrence of the symbol under the cursor within its project,
    /// declaration first.
    pub fn local_refs(&self, position: &Position) -> IndexResult<Answer<Vec<Range>>> {
        tracing::debug!(target: "query", "Local refs {}/{} {}", position.project, position.file, position.at());
        let located = try_ready!(self.locate(position)?);
        let ranges = located.index.local_references(&located.symbol.key)?;
        Ok(if ranges.is_empty() {
            Answer::NotFound
        } else {
            Answer::Ready(ranges)
        })
    }

    /// Location-independent spec of the symbol under the cursor. External
    /// symbols point at the dependency that provides them.
    pub fn position_to_def_spec(&self, position: &Position) -> IndexResult<Answer<DefSpec>> {
        tracing::debug!(target: "query", "Position to def spec {}/{} {}", position.project, position.file, position.at());
        Ok(self.locate(position)?.map(|located| match &located.symbol.origin {
            Some(origin) => DefSpec::new(
                &ProjectRef::new(origin.repo.clone(), String::new()),
                origin.unit.clone(),
                located.symbol.key,
            ),
            None => DefSpec::new(&position.project, located.index.config().unit.clone(), located.symbol.key),
        }))
    }

    /// Start of the declaration named by `spec`.
    pub fn def_spec_to_position(&self, spec: &DefSpec) -> IndexResult<Answer<Position>> {
        tracing::debug!(target: "query", "Def spec to position {}@{} {}", spec.repo, spec.revision, spec.path);
        let deadline = Instant::now() + self.timeout;
        let project = ProjectRef::new(spec.repo.clone(), spec.revision.clone());
        let workspace = try_ready!(self.workspace_within(&project, deadline)?);

        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some(indexes) = workspace.await_all(remaining)? else {
            return Ok(self.not_ready());
        };
        Ok(match workspace::first_definition(&indexes, spec)? {
            Some(definition) => Answer::Ready(Position::new(
                project,
                definition.range.file,
                definition.range.start_line,
                definition.range.start_column,
            )),
            None => Answer::NotFound,
        })
    }

    /// Dependencies referenced anywhere in the repository. Waits for every
    /// index of the repository.
    pub fn external_refs(&self, project: &ProjectRef) -> IndexResult<Answer<Vec<DefSpec>>> {
        tracing::debug!(target: "query", "External refs in {project}");
        let root = self.repositories.root_for(project).wait()?;
        let workspace = self.registry.get(root);

        let specs: IndexSet<DefSpec> = workspace
            .external_references()?
            .into_iter()
            .filter_map(|fact| {
                let origin = fact.origin?;
                Some(DefSpec::new(&ProjectRef::new(origin.repo, String::new()), origin.unit, fact.key))
            })
            .collect();
        Ok(Answer::Ready(specs.into_iter().collect()))
    }

    /// Exported declarations of the repository. Waits for every index of the
    /// repository.
    pub fn exported_symbols(&self, project: &ProjectRef) -> IndexResult<Answer<Vec<SymbolFact>>> {
        tracing::debug!(target: "query", "Exported symbols in {project}");
        let root = self.repositories.root_for(project).wait()?;
        let workspace = self.registry.get(root);
        Ok(Answer::Ready(workspace.exported_symbols()?))
    }

    /// Drop every cached repository, workspace and source text.
    pub fn purge(&self) {
        self.repositories.purge();
        self.registry.purge();
        self.translator.clear();
        crate::debug_event!("query", "purged");
    }
}
