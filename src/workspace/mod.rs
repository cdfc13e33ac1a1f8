//! All project indexes under one checked-out root.
//!
//! A [`Workspace`] routes a file to its project through the
//! [`ConfigLocator`] and hands out cache handles for that project's index.
//! Whole-tree operations wait for every index; single-file lookups never do.

pub mod repository;

pub use repository::{LocalCheckouts, RepositoryCache, RepositorySource, SingleCheckout};

use dashmap::DashMap;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analysis::{JavaAnalyzer, SymbolAnalyzer};
use crate::cache::{Pending, PendingCache, WorkerPool};
use crate::config::IndexingConfig;
use crate::error::{IndexError, IndexResult};
use crate::indexing::ProjectIndex;
use crate::paths;
use crate::project::{ConfigLocator, ProjectConfig};
use crate::types::{DefSpec, Range, SymbolFact};

/// Builds the analyzer for a workspace root.
pub type AnalyzerFactory = Arc<dyn Fn(&Path) -> Arc<dyn SymbolAnalyzer> + Send + Sync>;

type BuildJob = Box<dyn FnOnce() -> IndexResult<Arc<ProjectIndex>> + Send>;

pub struct Workspace {
    root: PathBuf,
    log_file_name: String,
    locator: ConfigLocator,
    indexes: PendingCache<PathBuf, Arc<ProjectIndex>>,
    analyzer: Arc<dyn SymbolAnalyzer>,
    pool: Arc<WorkerPool>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("indexes", &self.indexes.len())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn new(
        root: impl AsRef<Path>,
        config: &IndexingConfig,
        analyzer: Arc<dyn SymbolAnalyzer>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        let root = paths::normalize(root.as_ref());
        Self {
            locator: ConfigLocator::new(&root, config.config_file_name.clone()),
            root,
            log_file_name: config.log_file_name.clone(),
            indexes: PendingCache::new("indexes", Arc::clone(&pool)),
            analyzer,
            pool,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locator(&self) -> &ConfigLocator {
        &self.locator
    }

    /// Absolute form of a workspace-relative (or absolute) path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        paths::resolve_against(path.as_ref(), &self.root)
    }

    /// Cache handle for the index of the project owning `path`.
    ///
    /// No configuration for `path` is a [`IndexError::ConfigurationMissing`],
    /// which is different from an index that is not built yet.
    pub fn find_index_for(&self, path: impl AsRef<Path>) -> IndexResult<Pending<Arc<ProjectIndex>>> {
        let path = self.resolve(path);
        let directory = if path.is_dir() {
            path.as_path()
        } else {
            path.parent().unwrap_or(&self.root)
        };
        let config = self
            .locator
            .find(directory)
            .ok_or_else(|| IndexError::ConfigurationMissing { path: path.clone() })?;
        Ok(self.index_for_config(config))
    }

    /// Cache handle for the index of `config`, scheduling its build if none
    /// exists yet.
    pub fn index_for_config(&self, config: Arc<ProjectConfig>) -> Pending<Arc<ProjectIndex>> {
        let key = config.file().to_path_buf();
        self.indexes.get_or_create(key, self.build_job(config, false))
    }

    /// Throw away the index of `config` and build it again. A build already
    /// running is returned instead.
    pub fn rebuild(&self, config: Arc<ProjectConfig>) -> Pending<Arc<ProjectIndex>> {
        let key = config.file().to_path_buf();
        tracing::info!(target: "workspace", "Rebuilding index for {}", key.display());
        self.indexes.get_or_create_forced(key, self.build_job(config, true))
    }

    fn build_job(&self, config: Arc<ProjectConfig>, clear: bool) -> BuildJob {
        let analyzer = Arc::clone(&self.analyzer);
        let pool = Arc::clone(&self.pool);
        let log_file_name = self.log_file_name.clone();
        Box::new(move || {
            let index = Arc::new(ProjectIndex::new(config, &log_file_name));
            if clear {
                index.clear()?;
            }
            index.build(analyzer.as_ref(), &pool)?;
            Ok(index)
        })
    }

    /// Every configuration under the root, ordered by file path.
    pub fn configs(&self) -> Vec<Arc<ProjectConfig>> {
        let mut configs = self.locator.discover();
        configs.sort_by(|a, b| a.file().cmp(b.file()));
        configs
    }

    fn handles(&self) -> Vec<Pending<Arc<ProjectIndex>>> {
        self.configs()
            .into_iter()
            .map(|config| self.index_for_config(config))
            .collect()
    }

    /// Wait for every project's index. Blocks without bound; only for
    /// whole-tree operations.
    pub fn compute_all(&self) -> IndexResult<Vec<Arc<ProjectIndex>>> {
        self.handles().iter().map(Pending::wait).collect()
    }

    /// Like [`compute_all`](Self::compute_all), but gives up after
    /// `timeout`. `Ok(None)` means some index is still being built.
    pub fn await_all(&self, timeout: Duration) -> IndexResult<Option<Vec<Arc<ProjectIndex>>>> {
        let deadline = Instant::now() + timeout;
        let mut indexes = Vec::new();
        for handle in self.handles() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match handle.wait_timeout(remaining) {
                Some(index) => indexes.push(index?),
                None => return Ok(None),
            }
        }
        Ok(Some(indexes))
    }

    /// References to external dependencies across all projects.
    pub fn external_references(&self) -> IndexResult<Vec<SymbolFact>> {
        let mut refs = Vec::new();
        for index in self.compute_all()? {
            refs.extend(index.external_references()?);
        }
        Ok(refs)
    }

    /// Exported declarations across all projects, deduplicated by key and
    /// range in first-seen order.
    pub fn exported_symbols(&self) -> IndexResult<Vec<SymbolFact>> {
        let mut symbols: IndexMap<(String, Range), SymbolFact> = IndexMap::new();
        for index in self.compute_all()? {
            for fact in index.exported_symbols()? {
                symbols
                    .entry((fact.key.clone(), fact.range.clone()))
                    .or_insert(fact);
            }
        }
        Ok(symbols.into_values().collect())
    }

    /// Declaration named by `spec`, searched across all projects.
    pub fn cross_reference(&self, spec: &DefSpec) -> IndexResult<Option<SymbolFact>> {
        first_definition(&self.compute_all()?, spec)
    }

    pub fn position_for(&self, spec: &DefSpec) -> IndexResult<Option<Range>> {
        Ok(self.cross_reference(spec)?.map(|fact| fact.range))
    }

    /// Wait for in-flight builds, then forget every index and every
    /// memoized configuration.
    pub fn purge(&self) {
        self.indexes.invalidate_all();
        self.locator.invalidate();
        tracing::debug!(target: "workspace", "Purged workspace {}", self.root.display());
    }

    /// Index cache, for inspection.
    pub fn indexes(&self) -> &PendingCache<PathBuf, Arc<ProjectIndex>> {
        &self.indexes
    }
}

/// First declaration of `spec.path`, preferring projects of `spec.unit`.
pub fn first_definition(indexes: &[Arc<ProjectIndex>], spec: &DefSpec) -> IndexResult<Option<SymbolFact>> {
    let (preferred, rest): (Vec<_>, Vec<_>) = indexes
        .iter()
        .partition(|index| index.config().unit == spec.unit);
    for index in preferred.into_iter().chain(rest) {
        if let Some(fact) = index.resolve_definition(&spec.path)? {
            return Ok(Some(fact));
        }
    }
    Ok(None)
}

/// One [`Workspace`] per root path.
pub struct WorkspaceRegistry {
    config: IndexingConfig,
    pool: Arc<WorkerPool>,
    analyzers: AnalyzerFactory,
    workspaces: DashMap<PathBuf, Arc<Workspace>>,
}

impl WorkspaceRegistry {
    pub fn new(config: IndexingConfig, pool: Arc<WorkerPool>, analyzers: AnalyzerFactory) -> Self {
        Self {
            config,
            pool,
            analyzers,
            workspaces: DashMap::new(),
        }
    }

    /// Registry whose workspaces analyze Java sources.
    pub fn java(config: IndexingConfig, pool: Arc<WorkerPool>) -> Self {
        Self::new(
            config,
            pool,
            Arc::new(|root: &Path| Arc::new(JavaAnalyzer::new(root)) as Arc<dyn SymbolAnalyzer>),
        )
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// The workspace rooted at `root`, created on first use.
    pub fn get(&self, root: impl AsRef<Path>) -> Arc<Workspace> {
        let root = paths::normalize(root.as_ref());
        let workspace = self.workspaces.entry(root.clone()).or_insert_with(|| {
            tracing::debug!(target: "workspace", "Opening workspace {}", root.display());
            Arc::new(Workspace::new(
                &root,
                &self.config,
                (self.analyzers)(&root),
                Arc::clone(&self.pool),
            ))
        });
        Arc::clone(workspace.value())
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Purge and drop every workspace present at call time. Workspaces
    /// opened meanwhile survive.
    pub fn purge(&self) {
        let workspaces: Vec<(PathBuf, Arc<Workspace>)> = self
            .workspaces
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        for (_, workspace) in &workspaces {
            workspace.purge();
        }
        for (root, workspace) in &workspaces {
            self.workspaces
                .remove_if(root, |_, current| Arc::ptr_eq(current, workspace));
        }
        crate::log_event!("workspace", "purged", "{} workspaces", workspaces.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisUnit, StaticAnalyzer};
    use crate::project::CONFIG_FILE_NAME;
    use std::fs;
    use tempfile::TempDir;

    fn project(ws: &Path, dir: &str, unit: &str) -> Arc<ProjectConfig> {
        let target = ws.join(dir);
        fs::create_dir_all(target.join("src")).unwrap();
        let mut config = ProjectConfig::new(unit).with_source_root(format!("{dir}/src"));
        config.save(ws, &target, CONFIG_FILE_NAME).unwrap();
        Arc::new(config)
    }

    fn exported(key: &str, file: &str) -> SymbolFact {
        SymbolFact::definition(key, Range::new(file, 0, 6, 0, 9), crate::types::simple_name(key), "class")
    }

    fn workspace(ws: &TempDir, analyzer: StaticAnalyzer) -> Workspace {
        Workspace::new(
            ws.path(),
            &IndexingConfig::default(),
            Arc::new(analyzer),
            Arc::new(WorkerPool::new(2).unwrap()),
        )
    }

    #[test]
    fn test_find_index_for_file_in_project() {
        let ws = TempDir::new().unwrap();
        project(ws.path(), "app", "app");
        let analyzer = StaticAnalyzer::new().with_unit(
            "app",
            AnalysisUnit::new("app/src/A.java").with_declaration(exported("a.A", "app/src/A.java")),
        );
        let workspace = workspace(&ws, analyzer);

        let index = workspace.find_index_for("app/src/A.java").unwrap().wait().unwrap();
        assert!(index.is_built());
        assert_eq!(index.config().unit, "app");

        // second lookup hits the same entry
        let again = workspace.find_index_for("app/src/A.java").unwrap();
        assert!(Arc::ptr_eq(&again.wait().unwrap(), &index));
    }

    #[test]
    fn test_missing_configuration() {
        let ws = TempDir::new().unwrap();
        fs::create_dir_all(ws.path().join("loose")).unwrap();
        let workspace = workspace(&ws, StaticAnalyzer::new());

        let err = workspace.find_index_for("loose/B.java").unwrap_err();
        assert!(err.is_configuration_missing());
        assert!(workspace.indexes().is_empty());
    }

    #[test]
    fn test_exported_symbols_are_deduplicated() {
        let ws = TempDir::new().unwrap();
        project(ws.path(), "one", "one");
        project(ws.path(), "two", "two");
        let shared = exported("lib.Shared", "lib/Shared.java");
        let analyzer = StaticAnalyzer::new()
            .with_unit("one", AnalysisUnit::new("one/src/A.java").with_declaration(exported("a.A", "one/src/A.java")))
            .with_unit("one", AnalysisUnit::new("lib/Shared.java").with_declaration(shared.clone()))
            .with_unit("two", AnalysisUnit::new("lib/Shared.java").with_declaration(shared));
        let workspace = workspace(&ws, analyzer);

        let keys: Vec<_> = workspace
            .exported_symbols()
            .unwrap()
            .into_iter()
            .map(|f| f.key)
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"a.A".to_string()));
        assert!(keys.contains(&"lib.Shared".to_string()));
    }

    #[test]
    fn test_cross_reference_prefers_matching_unit() {
        let ws = TempDir::new().unwrap();
        project(ws.path(), "one", "one");
        project(ws.path(), "two", "two");
        let analyzer = StaticAnalyzer::new()
            .with_unit("one", AnalysisUnit::new("one/src/X.java").with_declaration(exported("p.X", "one/src/X.java")))
            .with_unit("two", AnalysisUnit::new("two/src/X.java").with_declaration(exported("p.X", "two/src/X.java")));
        let workspace = workspace(&ws, analyzer);
        let repo = crate::types::ProjectRef::new("github.com/acme/x", "abc");

        let range = workspace
            .position_for(&DefSpec::new(&repo, "two", "p.X"))
            .unwrap()
            .unwrap();
        assert_eq!(range.file, "two/src/X.java");
        assert!(workspace.position_for(&DefSpec::new(&repo, "two", "p.Nope")).unwrap().is_none());
    }

    #[test]
    fn test_await_all_times_out_while_building() {
        let ws = TempDir::new().unwrap();
        project(ws.path(), "slow", "slow");
        let analyzer = StaticAnalyzer::new()
            .with_unit("slow", AnalysisUnit::new("slow/src/S.java"))
            .with_delay(Duration::from_millis(300));
        let workspace = workspace(&ws, analyzer);

        assert!(workspace.await_all(Duration::from_millis(20)).unwrap().is_none());
        assert_eq!(workspace.await_all(Duration::from_secs(10)).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_replaces_index() {
        let ws = TempDir::new().unwrap();
        let config = project(ws.path(), "app", "app");
        let analyzer = StaticAnalyzer::new()
            .with_unit("app", AnalysisUnit::new("app/src/A.java").with_declaration(exported("a.A", "app/src/A.java")));
        let workspace = workspace(&ws, analyzer);

        let first = workspace.index_for_config(Arc::clone(&config)).wait().unwrap();
        let second = workspace.rebuild(config).wait().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_built());
    }

    #[test]
    fn test_registry_returns_one_workspace_per_root() {
        let ws = TempDir::new().unwrap();
        let registry = WorkspaceRegistry::java(IndexingConfig::default(), Arc::new(WorkerPool::new(1).unwrap()));

        let a = registry.get(ws.path());
        let b = registry.get(ws.path().join("."));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.purge();
        assert!(registry.is_empty());
        assert!(!Arc::ptr_eq(&a, &registry.get(ws.path())));
    }

    #[test]
    fn test_registry_purge_keeps_workspaces_opened_meanwhile() {
        let busy = TempDir::new().unwrap();
        let late = TempDir::new().unwrap();
        let config = project(busy.path(), "app", "app");
        let analyzer: Arc<dyn SymbolAnalyzer> = Arc::new(
            StaticAnalyzer::new()
                .with_unit("app", AnalysisUnit::new("app/src/A.java"))
                .with_delay(Duration::from_millis(300)),
        );
        let registry = Arc::new(WorkspaceRegistry::new(
            IndexingConfig::default(),
            Arc::new(WorkerPool::new(2).unwrap()),
            Arc::new(move |_: &Path| Arc::clone(&analyzer)),
        ));
        let building = registry.get(busy.path()).index_for_config(config);

        // purge blocks on the in-flight build
        let purging = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.purge())
        };
        std::thread::sleep(Duration::from_millis(50));
        let opened = registry.get(late.path());
        purging.join().unwrap();

        assert!(building.is_ready());
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&opened, &registry.get(late.path())));
    }
}
