//! Point and whole-tree query commands.

use std::sync::Arc;

use super::{CommandContext, emit};
use crate::cache::WorkerPool;
use crate::cli::PositionArgs;
use crate::error::{IndexError, IndexResult};
use crate::paths;
use crate::query::{Answer, QueryService};
use crate::types::{Position, ProjectRef};
use crate::workspace::{RepositoryCache, SingleCheckout, WorkspaceRegistry};

/// The working copy at the workspace root, as seen by the query service.
fn local_project(ctx: &CommandContext) -> ProjectRef {
    let name = ctx
        .root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "local".to_string());
    ProjectRef::new(name, "working-copy")
}

fn service(ctx: &CommandContext) -> IndexResult<QueryService> {
    let pool = Arc::new(WorkerPool::new(ctx.settings.indexing.worker_threads)?);
    let registry = Arc::new(WorkspaceRegistry::java(ctx.settings.indexing.clone(), Arc::clone(&pool)));
    let repositories = RepositoryCache::new(Arc::new(SingleCheckout::new(&ctx.root)), pool);
    Ok(QueryService::new(registry, repositories, &ctx.settings.query))
}

fn position(ctx: &CommandContext, args: &PositionArgs) -> IndexResult<Position> {
    let file = ctx.absolute(&args.file);
    let relative = paths::relative_to(&file, &ctx.root).ok_or_else(|| IndexError::OutsideWorkspace {
        path: file.clone(),
        root: ctx.root.clone(),
    })?;
    Ok(Position::new(local_project(ctx), relative, args.line, args.character))
}

/// Re-issue `query` until it stops answering `NotReady`. Indexes finish
/// building in the background between attempts.
fn until_ready<T>(mut query: impl FnMut() -> IndexResult<Answer<T>>) -> IndexResult<Answer<T>> {
    loop {
        match query()? {
            Answer::NotReady { retry_after } => {
                tracing::debug!(target: "query", "Index not ready, retrying in {retry_after:?}");
                std::thread::sleep(retry_after);
            }
            answer => return Ok(answer),
        }
    }
}

pub fn run_definition(ctx: &CommandContext, args: &PositionArgs) -> IndexResult<()> {
    let service = service(ctx)?;
    let position = position(ctx, args)?;
    emit(&until_ready(|| service.definition(&position))?)
}

pub fn run_hover(ctx: &CommandContext, args: &PositionArgs) -> IndexResult<()> {
    let service = service(ctx)?;
    let position = position(ctx, args)?;
    emit(&until_ready(|| service.hover(&position))?)
}

pub fn run_refs(ctx: &CommandContext, args: &PositionArgs) -> IndexResult<()> {
    let service = service(ctx)?;
    let position = position(ctx, args)?;
    emit(&until_ready(|| service.local_refs(&position))?)
}

pub fn run_exported(ctx: &CommandContext) -> IndexResult<()> {
    let service = service(ctx)?;
    emit(&service.exported_symbols(&local_project(ctx))?)
}

pub fn run_external_refs(ctx: &CommandContext) -> IndexResult<()> {
    let service = service(ctx)?;
    emit(&service.external_refs(&local_project(ctx))?)
}
