//! Sharing of background index builds between concurrent queries.

use refindex::config::{IndexingConfig, QueryConfig};
use refindex::project::CONFIG_FILE_NAME;
use refindex::{
    AnalysisUnit, Answer, Position, ProjectConfig, ProjectRef, QueryService, Range, RepositoryCache,
    SingleCheckout, StaticAnalyzer, SymbolAnalyzer, SymbolFact, WorkerPool, WorkspaceRegistry,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FILE: &str = "app/src/A.java";

struct Fixture {
    ws: TempDir,
    analyzer: Arc<StaticAnalyzer>,
    service: Arc<QueryService>,
    project: ProjectRef,
}

fn fixture(delay: Duration, timeout_ms: u64) -> Fixture {
    let ws = TempDir::new().unwrap();
    let root = ws.path();
    std::fs::create_dir_all(root.join("app/src")).unwrap();
    std::fs::write(root.join(FILE), "class A {\n  A next;\n}\n").unwrap();
    let mut config = ProjectConfig::new("app").with_source_root("app/src");
    config.save(root, &root.join("app"), CONFIG_FILE_NAME).unwrap();

    let unit = AnalysisUnit::new(FILE)
        .with_declaration(SymbolFact::definition("A", Range::new(FILE, 0, 6, 0, 7), "A", "class"))
        .with_reference(SymbolFact::reference("A", Range::new(FILE, 1, 2, 1, 3)));
    let analyzer = Arc::new(StaticAnalyzer::new().with_unit("app", unit).with_delay(delay));

    let service = Arc::new(service_for(root, Arc::clone(&analyzer), timeout_ms));
    Fixture {
        ws,
        analyzer,
        service,
        project: ProjectRef::new("acme/app", "1"),
    }
}

fn service_for(root: &Path, analyzer: Arc<StaticAnalyzer>, timeout_ms: u64) -> QueryService {
    let pool = Arc::new(WorkerPool::new(4).unwrap());
    let registry = Arc::new(WorkspaceRegistry::new(
        IndexingConfig::default(),
        Arc::clone(&pool),
        Arc::new(move |_: &Path| Arc::clone(&analyzer) as Arc<dyn SymbolAnalyzer>),
    ));
    let repositories = RepositoryCache::new(Arc::new(SingleCheckout::new(root)), pool);
    let query = QueryConfig {
        timeout_ms,
        retry_after_ms: 5,
    };
    QueryService::new(registry, repositories, &query)
}

#[test]
fn test_concurrent_queries_build_once() {
    let fx = fixture(Duration::from_millis(100), 5_000);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&fx.service);
            let barrier = Arc::clone(&barrier);
            let position = Position::new(fx.project.clone(), FILE, 1, 2);
            thread::spawn(move || {
                barrier.wait();
                service.definition(&position).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let definition = handle.join().unwrap().ready().unwrap();
        assert_eq!(definition.range, Range::new(FILE, 0, 6, 0, 7));
    }
    assert_eq!(fx.analyzer.runs(), 1);
}

#[test]
fn test_slow_build_answers_not_ready_within_timeout() {
    let fx = fixture(Duration::from_millis(500), 50);
    let position = Position::new(fx.project.clone(), FILE, 1, 2);

    let started = Instant::now();
    let answer = fx.service.definition(&position).unwrap();
    assert!(answer.is_not_ready());
    assert!(started.elapsed() < Duration::from_millis(400));

    // the build kept going in the background
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match fx.service.definition(&position).unwrap() {
            Answer::Ready(fact) => {
                assert_eq!(fact.key, "A");
                break;
            }
            Answer::NotReady { retry_after } => {
                assert!(Instant::now() < deadline, "build never finished");
                thread::sleep(retry_after);
            }
            Answer::NotFound => panic!("definition should be found"),
        }
    }
    assert_eq!(fx.analyzer.runs(), 1);
}

#[test]
fn test_purge_drops_cached_workspaces() {
    let fx = fixture(Duration::ZERO, 5_000);
    let position = Position::new(fx.project.clone(), FILE, 0, 6);

    assert!(fx.service.local_refs(&position).unwrap().is_ready());
    let before = fx.service.registry().get(fx.ws.path());
    assert_eq!(fx.service.registry().len(), 1);

    fx.service.purge();
    assert!(fx.service.registry().is_empty());

    let refs = fx.service.local_refs(&position).unwrap().ready().unwrap();
    assert_eq!(refs.len(), 2);
    let after = fx.service.registry().get(fx.ws.path());
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_log_is_published_atomically() {
    let fx = fixture(Duration::from_millis(200), 10);
    let log = fx.ws.path().join("app").join(IndexingConfig::default().log_file_name);
    let position = Position::new(fx.project.clone(), FILE, 1, 2);

    assert!(fx.service.definition(&position).unwrap().is_not_ready());
    // mid-build, readers see no log at all rather than a partial one
    assert!(!log.exists());

    let deadline = Instant::now() + Duration::from_secs(10);
    while !fx.service.definition(&position).unwrap().is_ready() {
        assert!(Instant::now() < deadline, "log never published");
        thread::sleep(Duration::from_millis(10));
    }
    assert!(log.exists());
    let content = std::fs::read_to_string(&log).unwrap();
    assert_eq!(content.lines().count(), 2);
    let leftovers: Vec<_> = std::fs::read_dir(fx.ws.path().join("app"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
