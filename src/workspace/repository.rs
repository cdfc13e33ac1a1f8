//! Local checkouts of repositories, acquired at most once per revision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{Pending, PendingCache, WorkerPool};
use crate::error::{IndexError, IndexResult};
use crate::paths;
use crate::types::ProjectRef;

/// Produces a local directory holding the sources of a repository revision.
pub trait RepositorySource: Send + Sync {
    fn acquire(&self, project: &ProjectRef) -> IndexResult<PathBuf>;
}

/// Checkouts laid out as `<base>/<repo>/<revision>`, prepared by someone
/// else. A missing checkout is an error.
#[derive(Debug, Clone)]
pub struct LocalCheckouts {
    base: PathBuf,
}

impl LocalCheckouts {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: paths::normalize(base.as_ref()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path_for(&self, project: &ProjectRef) -> PathBuf {
        paths::normalize(&self.base.join(&project.repo).join(&project.revision))
    }
}

impl RepositorySource for LocalCheckouts {
    fn acquire(&self, project: &ProjectRef) -> IndexResult<PathBuf> {
        let path = self.path_for(project);
        // repo ids like "../x" must not escape the base directory
        if !paths::is_within(&path, &self.base) {
            return Err(IndexError::Repository {
                repo: project.repo.clone(),
                revision: project.revision.clone(),
                reason: format!("{} is outside of {}", path.display(), self.base.display()),
            });
        }
        if !path.is_dir() {
            return Err(IndexError::Repository {
                repo: project.repo.clone(),
                revision: project.revision.clone(),
                reason: format!("no checkout at {}", path.display()),
            });
        }
        Ok(path)
    }
}

/// Every repository resolves to one local directory. Used when serving a
/// single working copy, e.g. from the command line.
#[derive(Debug, Clone)]
pub struct SingleCheckout {
    root: PathBuf,
}

impl SingleCheckout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: paths::normalize(root.as_ref()),
        }
    }
}

impl RepositorySource for SingleCheckout {
    fn acquire(&self, project: &ProjectRef) -> IndexResult<PathBuf> {
        if self.root.is_dir() {
            Ok(self.root.clone())
        } else {
            Err(IndexError::Repository {
                repo: project.repo.clone(),
                revision: project.revision.clone(),
                reason: format!("{} is not a directory", self.root.display()),
            })
        }
    }
}

/// Memoized repository acquisition.
pub struct RepositoryCache {
    source: Arc<dyn RepositorySource>,
    roots: PendingCache<ProjectRef, PathBuf>,
}

impl RepositoryCache {
    pub fn new(source: Arc<dyn RepositorySource>, pool: Arc<WorkerPool>) -> Self {
        Self {
            source,
            roots: PendingCache::new("repositories", pool),
        }
    }

    /// Handle on the checkout root of `project`; acquisition runs in the
    /// background on first request.
    pub fn root_for(&self, project: &ProjectRef) -> Pending<PathBuf> {
        let source = Arc::clone(&self.source);
        let target = project.clone();
        self.roots.get_or_create(project.clone(), move || {
            let root = source.acquire(&target)?;
            tracing::debug!(target: "workspace", "Acquired {target} at {}", root.display());
            Ok(root)
        })
    }

    /// Forget `project`, e.g. after its checkout was replaced.
    pub fn invalidate(&self, project: &ProjectRef) {
        self.roots.invalidate(project);
    }

    pub fn purge(&self) {
        self.roots.invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
