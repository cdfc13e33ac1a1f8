//! Fixed-size worker pool shared by the caches and the index builder.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{IndexError, IndexResult};

/// Bounded set of background threads.
///
/// Cache computations are spawned here; index builds fan out their
/// per-unit work inside [`WorkerPool::install`] so nested parallelism stays
/// on the same threads instead of spilling into rayon's global pool.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Build a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> IndexResult<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("refindex-worker-{i}"))
            .build()
            .map_err(|e| IndexError::Executor(e.to_string()))?;

        tracing::debug!(target: "cache", "Worker pool started with {threads} threads");

        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `job` on a worker thread without waiting for it.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }

    /// Run `op` inside the pool, blocking the caller until it returns.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// CPU count minus two, never below one.
pub fn default_threads() -> usize {
    num_cpus::get().saturating_sub(2).max(1)
}
