//! Index command.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::{CommandContext, emit};
use crate::cache::WorkerPool;
use crate::error::IndexResult;
use crate::indexing::BuildState;
use crate::workspace::WorkspaceRegistry;

#[derive(Debug, Serialize)]
struct IndexReport {
    config: PathBuf,
    log: PathBuf,
    unit: String,
    units: usize,
    facts: usize,
    elapsed_ms: u128,
    reused: bool,
}

/// Build (or with `force`, rebuild) every project index under the root.
pub fn run_index(ctx: &CommandContext, force: bool) -> IndexResult<()> {
    let pool = Arc::new(WorkerPool::new(ctx.settings.indexing.worker_threads)?);
    let registry = WorkspaceRegistry::java(ctx.settings.indexing.clone(), pool);
    let workspace = registry.get(&ctx.root);

    let handles: Vec<_> = workspace
        .configs()
        .into_iter()
        .map(|config| {
            if force {
                workspace.rebuild(config)
            } else {
                workspace.index_for_config(config)
            }
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let index = handle.wait()?;
        let stats = match index.state() {
            BuildState::Built(stats) => stats,
            _ => Default::default(),
        };
        reports.push(IndexReport {
            config: index.config_file().to_path_buf(),
            log: index.log_path().to_path_buf(),
            unit: index.config().unit.clone(),
            units: stats.units,
            facts: stats.facts,
            elapsed_ms: stats.elapsed.as_millis(),
            reused: stats.reused,
        });
    }

    crate::log_event!("index", "done", "{} projects", reports.len());
    emit(&reports)
}
