//! Index of one project: building its record log and answering queries
//! from it.

use indexmap::IndexSet;
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analysis::SymbolAnalyzer;
use crate::cache::{WorkerPool, panic_message};
use crate::error::{IndexError, IndexResult};
use crate::project::ProjectConfig;
use crate::storage::{RecordLog, StorageResult};
use crate::types::{LineCol, Range, SymbolFact};

/// Statistics from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Compilation units analyzed
    pub units: usize,
    /// Facts written to the log
    pub facts: usize,
    pub elapsed: Duration,
    /// The log was already on disk; nothing was analyzed
    pub reused: bool,
}

impl BuildStats {
    fn reused() -> Self {
        Self {
            reused: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum BuildState {
    NotBuilt,
    Building,
    Built(BuildStats),
    Failed(Arc<IndexError>),
}

/// One project's record log plus its build state.
#[derive(Debug)]
pub struct ProjectIndex {
    config: Arc<ProjectConfig>,
    log: RecordLog,
    state: Mutex<BuildState>,
    changed: Condvar,
}

impl ProjectIndex {
    /// Index for `config`, logged to `log_file_name` beside its config file.
    pub fn new(config: Arc<ProjectConfig>, log_file_name: &str) -> Self {
        let log = RecordLog::new(config.log_path(log_file_name));
        Self {
            config,
            log,
            state: Mutex::new(BuildState::NotBuilt),
            changed: Condvar::new(),
        }
    }

    pub fn config(&self) -> &Arc<ProjectConfig> {
        &self.config
    }

    /// Path of the project's configuration file; identifies the index.
    pub fn config_file(&self) -> &Path {
        self.config.file()
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn state(&self) -> BuildState {
        self.state.lock().clone()
    }

    /// A complete log exists on disk.
    pub fn is_built(&self) -> bool {
        self.log.exists()
    }

    /// Build the log unless it already exists.
    ///
    /// A build already running on another thread is waited for, and a
    /// recorded failure is returned as is.
    pub fn build(&self, analyzer: &dyn SymbolAnalyzer, pool: &WorkerPool) -> IndexResult<BuildStats> {
        {
            let mut state = self.state.lock();
            loop {
                match &*state {
                    BuildState::Built(stats) => return Ok(stats.clone()),
                    BuildState::Failed(e) => return Err(IndexError::Cached(Arc::clone(e))),
                    BuildState::Building => self.changed.wait(&mut state),
                    BuildState::NotBuilt => {
                        if self.log.exists() {
                            tracing::debug!(target: "index", "{}: reusing {}", self.config.unit, self.log.path().display());
                            let stats = BuildStats::reused();
                            *state = BuildState::Built(stats.clone());
                            return Ok(stats);
                        }
                        *state = BuildState::Building;
                        break;
                    }
                }
            }
        }

        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.run_build(analyzer, pool))) {
            Ok(result) => result,
            Err(payload) => Err(IndexError::Panicked(panic_message(payload.as_ref()))),
        };

        let mut state = self.state.lock();
        let result = match result {
            Ok(stats) => {
                crate::log_event!(
                    "index",
                    "built",
                    "{}: {} units, {} facts in {:?}",
                    self.config.unit,
                    stats.units,
                    stats.facts,
                    stats.elapsed
                );
                *state = BuildState::Built(stats.clone());
                Ok(stats)
            }
            Err(e) => {
                let e = Arc::new(e);
                *state = BuildState::Failed(Arc::clone(&e));
                Err(IndexError::Cached(e))
            }
        };
        self.changed.notify_all();
        result
    }

    fn run_build(&self, analyzer: &dyn SymbolAnalyzer, pool: &WorkerPool) -> IndexResult<BuildStats> {
        let start = Instant::now();
        let writer = self.log.writer()?;

        let units = pool.install(|| -> IndexResult<usize> {
            let stream = analyzer.analyze(&self.config)?;
            stream
                .par_bridge()
                .map(|pending| -> IndexResult<usize> {
                    let unit_id = pending.unit_id().to_string();
                    let unit = pending.resolve()?;
                    let written = writer.append_all(unit.facts())?;
                    tracing::trace!(target: "index", "{unit_id}: {written} facts");
                    Ok(1)
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })?;

        let facts = writer.len();
        writer.finish()?;

        Ok(BuildStats {
            units,
            facts,
            elapsed: start.elapsed(),
            reused: false,
        })
    }

    /// Remove the on-disk log and forget the build outcome. A build in
    /// progress is waited for first.
    pub fn clear(&self) -> IndexResult<()> {
        let mut state = self.state.lock();
        while matches!(*state, BuildState::Building) {
            self.changed.wait(&mut state);
        }
        self.log.remove()?;
        *state = BuildState::NotBuilt;
        tracing::debug!(target: "index", "{}: cleared", self.config.unit);
        Ok(())
    }

    fn scan<P>(&self, predicate: P) -> IndexResult<impl Iterator<Item = StorageResult<SymbolFact>>>
    where
        P: FnMut(&SymbolFact) -> bool,
    {
        Ok(self.log.scan(predicate)?)
    }

    fn narrowest<P>(&self, file: &str, at: LineCol, mut accept: P) -> IndexResult<Option<SymbolFact>>
    where
        P: FnMut(&SymbolFact) -> bool,
    {
        let mut best: Option<SymbolFact> = None;
        for fact in self.scan(|f| f.range.file == file && f.range.contains(at) && accept(f))? {
            let fact = fact?;
            let replace = match &best {
                None => true,
                Some(current) => {
                    fact.range.is_nested_in(&current.range)
                        || (fact.range == current.range && wins_tie(&fact, current))
                }
            };
            if replace {
                best = Some(fact);
            }
        }
        Ok(best)
    }

    /// Narrowest declaration in `file` whose range contains `at`.
    pub fn find_enclosing_symbol(&self, file: &str, at: LineCol) -> IndexResult<Option<SymbolFact>> {
        self.narrowest(file, at, SymbolFact::is_def)
    }

    /// Narrowest declaration or reference in `file` under `at`.
    pub fn symbol_at(&self, file: &str, at: LineCol) -> IndexResult<Option<SymbolFact>> {
        self.narrowest(file, at, |_| true)
    }

    pub fn resolve_definition(&self, key: &str) -> IndexResult<Option<SymbolFact>> {
        self.scan(|f| f.is_def() && f.key == key)?
            .next()
            .transpose()
            .map_err(Into::into)
    }

    /// The declaration of `key` first, then every local reference to it.
    pub fn local_references(&self, key: &str) -> IndexResult<Vec<Range>> {
        let mut definition = None;
        let mut references = IndexSet::new();
        for fact in self.scan(|f| f.key == key && !f.is_external())? {
            let fact = fact?;
            if fact.is_def() {
                definition.get_or_insert(fact.range);
            } else {
                references.insert(fact.range);
            }
        }

        let mut ranges = IndexSet::with_capacity(references.len() + 1);
        ranges.extend(definition);
        ranges.extend(references);
        Ok(ranges.into_iter().collect())
    }

    /// References to symbols of external dependencies.
    pub fn external_references(&self) -> IndexResult<Vec<SymbolFact>> {
        self.collect(|f| f.is_ref() && f.is_external())
    }

    pub fn exported_symbols(&self) -> IndexResult<Vec<SymbolFact>> {
        self.collect(|f| f.is_def() && f.exported)
    }

    fn collect<P>(&self, predicate: P) -> IndexResult<Vec<SymbolFact>>
    where
        P: FnMut(&SymbolFact) -> bool,
    {
        self.scan(predicate)?
            .collect::<StorageResult<Vec<_>>>()
            .map_err(Into::into)
    }
}

/// Order among facts with identical ranges: declarations before references,
/// then the smaller key. Independent of the order records were appended in.
fn wins_tie(candidate: &SymbolFact, current: &SymbolFact) -> bool {
    (candidate.is_ref(), candidate.key.as_str()) < (current.is_ref(), current.key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisUnit, StaticAnalyzer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> Arc<ProjectConfig> {
        let mut config = ProjectConfig::new("app");
        config
            .save(dir, dir, crate::project::CONFIG_FILE_NAME)
            .unwrap();
        Arc::new(config)
    }

    fn def(key: &str, range: Range) -> SymbolFact {
        SymbolFact::definition(key, range, crate::types::simple_name(key), "class")
    }

    fn sample() -> StaticAnalyzer {
        let foo = AnalysisUnit::new("Foo.java")
            .with_declaration(def("a.Foo", Range::new("Foo.java", 0, 0, 20, 1)))
            .with_declaration(def("a.Foo.bar", Range::new("Foo.java", 2, 4, 8, 5)))
            .with_declaration(def("a.Foo.bar.x", Range::new("Foo.java", 3, 8, 3, 9)).with_exported(false))
            .with_reference(SymbolFact::reference("a.Foo", Range::new("Foo.java", 5, 8, 5, 11)))
            .with_reference(SymbolFact::reference("a.Foo", Range::new("Foo.java", 5, 8, 5, 11)))
            .with_reference(
                SymbolFact::reference("org.lib.Util", Range::new("Foo.java", 6, 8, 6, 12))
                    .with_origin(crate::types::ExternalOrigin::new("github.com/org/lib", "org.lib/util")),
            );
        let bar = AnalysisUnit::new("Bar.java")
            .with_reference(SymbolFact::reference("a.Foo", Range::new("Bar.java", 1, 0, 1, 3)));
        StaticAnalyzer::new().with_unit("app", foo).with_unit("app", bar)
    }

    fn built(dir: &TempDir) -> ProjectIndex {
        let index = ProjectIndex::new(config_in(dir.path()), ".refindex.idx");
        let pool = WorkerPool::new(2).unwrap();
        let stats = index.build(&sample(), &pool).unwrap();
        assert_eq!(stats.units, 2);
        assert_eq!(stats.facts, 7);
        index
    }

    #[test]
    fn test_build_publishes_log() {
        let dir = TempDir::new().unwrap();
        let index = built(&dir);
        assert!(index.is_built());
        assert!(matches!(index.state(), BuildState::Built(_)));

        // a fresh index over the same config picks the log up from disk
        let again = ProjectIndex::new(Arc::clone(index.config()), ".refindex.idx");
        let analyzer = sample();
        let stats = again.build(&analyzer, &WorkerPool::new(1).unwrap()).unwrap();
        assert!(stats.reused);
        assert_eq!(analyzer.runs(), 0);
    }

    #[test]
    fn test_failed_unit_fails_build_and_leaves_no_log() {
        let dir = TempDir::new().unwrap();
        let index = ProjectIndex::new(config_in(dir.path()), ".refindex.idx");
        let analyzer = sample().with_failure("Bar.java", "syntax error");
        let pool = WorkerPool::new(2).unwrap();

        let err = index.build(&analyzer, &pool).unwrap_err();
        assert!(matches!(err.root_cause(), IndexError::Analysis { .. }));
        assert!(!index.is_built());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        // the failure sticks without re-running the analyzer
        assert!(index.build(&analyzer, &pool).is_err());
        assert_eq!(analyzer.runs(), 1);
    }

    #[test]
    fn test_concurrent_build_runs_once() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(ProjectIndex::new(config_in(dir.path()), ".refindex.idx"));
        let analyzer = Arc::new(sample().with_delay(Duration::from_millis(30)));
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        let barrier = Arc::new(Barrier::new(4));
        let built = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (index, analyzer, pool, barrier, built) = (
                    Arc::clone(&index),
                    Arc::clone(&analyzer),
                    Arc::clone(&pool),
                    Arc::clone(&barrier),
                    Arc::clone(&built),
                );
                std::thread::spawn(move || {
                    barrier.wait();
                    let stats = index.build(analyzer.as_ref(), &pool).unwrap();
                    if stats.facts > 0 {
                        built.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(analyzer.runs(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 4, "every caller sees the same build");
    }

    #[test]
    fn test_clear_resets_to_not_built() {
        let dir = TempDir::new().unwrap();
        let index = built(&dir);
        index.clear().unwrap();
        assert!(!index.is_built());
        assert!(matches!(index.state(), BuildState::NotBuilt));
    }

    #[test]
    fn test_enclosing_symbol_is_narrowest() {
        let dir = TempDir::new().unwrap();
        let index = built(&dir);

        let inner = index.find_enclosing_symbol("Foo.java", LineCol::new(3, 8)).unwrap();
        assert_eq!(inner.unwrap().key, "a.Foo.bar.x");

        let method = index.find_enclosing_symbol("Foo.java", LineCol::new(7, 0)).unwrap();
        assert_eq!(method.unwrap().key, "a.Foo.bar");

        assert!(index.find_enclosing_symbol("Foo.java", LineCol::new(30, 0)).unwrap().is_none());
        assert!(index.find_enclosing_symbol("Other.java", LineCol::new(3, 8)).unwrap().is_none());
    }

    #[test]
    fn test_symbol_at_prefers_reference_under_cursor() {
        let dir = TempDir::new().unwrap();
        let index = built(&dir);
        let fact = index.symbol_at("Foo.java", LineCol::new(5, 9)).unwrap().unwrap();
        assert!(fact.is_ref());
        assert_eq!(fact.key, "a.Foo");
    }

    #[test]
    fn test_local_references_put_definition_first_and_dedupe() {
        let dir = TempDir::new().unwrap();
        let index = built(&dir);

        let refs = index.local_references("a.Foo").unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0], Range::new("Foo.java", 0, 0, 20, 1));
        assert!(refs.contains(&Range::new("Bar.java", 1, 0, 1, 3)));

        assert!(index.local_references("org.lib.Util").unwrap().is_empty());
        assert!(index.resolve_definition("a.Missing").unwrap().is_none());
    }

    #[test]
    fn test_external_and_exported() {
        let dir = TempDir::new().unwrap();
        let index = built(&dir);

        let external = index.external_references().unwrap();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].origin.as_ref().unwrap().unit, "org.lib/util");

        let mut exported: Vec<_> = index
            .exported_symbols()
            .unwrap()
            .into_iter()
            .map(|f| f.key)
            .collect();
        exported.sort();
        assert_eq!(exported, vec!["a.Foo", "a.Foo.bar"]);
    }

    #[test]
    fn test_identical_ranges_resolve_independent_of_order() {
        let range = Range::new("Foo.java", 4, 2, 4, 5);
        let forward = AnalysisUnit::new("Foo.java")
            .with_reference(SymbolFact::reference("b.Two", range.clone()))
            .with_reference(SymbolFact::reference("a.One", range.clone()));
        let backward = AnalysisUnit::new("Foo.java")
            .with_reference(SymbolFact::reference("a.One", range.clone()))
            .with_reference(SymbolFact::reference("b.Two", range.clone()));

        for unit in [forward, backward] {
            let dir = TempDir::new().unwrap();
            let index = ProjectIndex::new(config_in(dir.path()), ".refindex.idx");
            index
                .build(&StaticAnalyzer::new().with_unit("app", unit), &WorkerPool::new(1).unwrap())
                .unwrap();
            let fact = index.symbol_at("Foo.java", LineCol::new(4, 3)).unwrap().unwrap();
            assert_eq!(fact.key, "a.One");
        }

        // a declaration wins over a reference on the same range
        let dir = TempDir::new().unwrap();
        let index = ProjectIndex::new(config_in(dir.path()), ".refindex.idx");
        let unit = AnalysisUnit::new("Foo.java")
            .with_reference(SymbolFact::reference("a.One", range.clone()))
            .with_declaration(def("z.Last", range));
        index
            .build(&StaticAnalyzer::new().with_unit("app", unit), &WorkerPool::new(1).unwrap())
            .unwrap();
        let fact = index.symbol_at("Foo.java", LineCol::new(4, 3)).unwrap().unwrap();
        assert!(fact.is_def());
        assert_eq!(fact.key, "z.Last");
    }
}
