//! Keyed cache of background computations.
//!
//! Each key maps to a [`Pending`] entry. The first caller for a key schedules
//! the computation on the shared [`WorkerPool`]; every other caller receives a
//! handle to the same entry and decides for itself whether to block, wait with
//! a bound, or poll.

pub mod pool;

pub use pool::WorkerPool;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{IndexError, IndexResult};

/// Observable state of one entry.
#[derive(Debug, Clone)]
pub enum EntryState<V> {
    Pending,
    Ready(V),
    Failed(Arc<IndexError>),
}

struct Slot<V> {
    state: Mutex<EntryState<V>>,
    done: Condvar,
    created_at: Instant,
}

/// Handle on a computation that may still be running.
///
/// Cloning is cheap; all clones observe the same completion.
pub struct Pending<V> {
    slot: Arc<Slot<V>>,
}

impl<V> Clone for Pending<V> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<V> fmt::Debug for Pending<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.slot.state.lock() {
            EntryState::Pending => "pending",
            EntryState::Ready(_) => "ready",
            EntryState::Failed(_) => "failed",
        };
        f.debug_struct("Pending")
            .field("state", &state)
            .field("created_at", &self.slot.created_at)
            .finish()
    }
}

impl<V: Clone> Pending<V> {
    fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                state: Mutex::new(EntryState::Pending),
                done: Condvar::new(),
                created_at: Instant::now(),
            }),
        }
    }

    /// An entry that is already complete.
    pub fn completed(result: IndexResult<V>) -> Self {
        let pending = Self::new();
        pending.complete(result);
        pending
    }

    fn complete(&self, result: IndexResult<V>) {
        let mut state = self.slot.state.lock();
        *state = match result {
            Ok(value) => EntryState::Ready(value),
            Err(e) => EntryState::Failed(Arc::new(e)),
        };
        drop(state);
        self.slot.done.notify_all();
    }

    pub fn state(&self) -> EntryState<V> {
        self.slot.state.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.slot.state.lock(), EntryState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.slot.state.lock(), EntryState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.slot.state.lock(), EntryState::Failed(_))
    }

    /// The outcome if the computation has finished, without blocking.
    pub fn try_get(&self) -> Option<IndexResult<V>> {
        outcome(&self.slot.state.lock())
    }

    /// Block until the computation finishes.
    pub fn wait(&self) -> IndexResult<V> {
        let mut state = self.slot.state.lock();
        loop {
            if let Some(result) = outcome(&state) {
                return result;
            }
            self.slot.done.wait(&mut state);
        }
    }

    /// Block for at most `timeout`. `None` means still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<IndexResult<V>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        loop {
            if let Some(result) = outcome(&state) {
                return Some(result);
            }
            if self.slot.done.wait_until(&mut state, deadline).timed_out() {
                return outcome(&state);
            }
        }
    }

    pub fn created_at(&self) -> Instant {
        self.slot.created_at
    }

    /// Both handles refer to the same entry.
    pub fn same_as(&self, other: &Pending<V>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

fn outcome<V: Clone>(state: &EntryState<V>) -> Option<IndexResult<V>> {
    match state {
        EntryState::Pending => None,
        EntryState::Ready(value) => Some(Ok(value.clone())),
        EntryState::Failed(e) => Some(Err(IndexError::Cached(Arc::clone(e)))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Map from key to at most one live computation.
pub struct PendingCache<K, V> {
    name: &'static str,
    entries: DashMap<K, Pending<V>>,
    pool: Arc<WorkerPool>,
}

impl<K, V> PendingCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `name` only shows up in log lines.
    pub fn new(name: &'static str, pool: Arc<WorkerPool>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            pool,
        }
    }

    /// Return the entry for `key`, scheduling `compute` if there is none.
    pub fn get_or_create<F>(&self, key: K, compute: F) -> Pending<V>
    where
        F: FnOnce() -> IndexResult<V> + Send + 'static,
    {
        let pending = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => return entry.get().clone(),
            Entry::Vacant(entry) => {
                let pending = Pending::new();
                entry.insert(pending.clone());
                pending
            }
        };
        self.schedule(key, pending.clone(), compute);
        pending
    }

    /// Like [`get_or_create`](Self::get_or_create), but a completed entry is
    /// replaced by a fresh computation. A still-pending entry is returned as is.
    pub fn get_or_create_forced<F>(&self, key: K, compute: F) -> Pending<V>
    where
        F: FnOnce() -> IndexResult<V> + Send + 'static,
    {
        let pending = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_pending() {
                    return entry.get().clone();
                }
                let pending = Pending::new();
                entry.insert(pending.clone());
                pending
            }
            Entry::Vacant(entry) => {
                let pending = Pending::new();
                entry.insert(pending.clone());
                pending
            }
        };
        self.schedule(key, pending.clone(), compute);
        pending
    }

    fn schedule<F>(&self, key: K, pending: Pending<V>, compute: F)
    where
        F: FnOnce() -> IndexResult<V> + Send + 'static,
    {
        let name = self.name;
        tracing::trace!(target: "cache", "{name}: scheduling {key:?}");
        self.pool.spawn(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(compute)) {
                Ok(result) => result,
                Err(payload) => Err(IndexError::Panicked(panic_message(payload.as_ref()))),
            };
            if let Err(e) = &result {
                tracing::error!(target: "cache", "{name}: computation for {key:?} failed: {e}");
            }
            pending.complete(result);
        });
    }

    pub fn get(&self, key: &K) -> Option<Pending<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Drop the entry for `key`. Holders of its handle are unaffected.
    pub fn invalidate(&self, key: &K) -> Option<Pending<V>> {
        self.entries.remove(key).map(|(_, pending)| pending)
    }

    /// Wait for every computation in flight at call time, then remove all
    /// entries present at call time. Entries created meanwhile survive.
    pub fn invalidate_all(&self) {
        let snapshot: Vec<(K, Pending<V>)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (_, pending) in &snapshot {
            if pending.is_pending() {
                let _ = pending.wait();
            }
        }

        for (key, pending) in snapshot {
            self.entries
                .remove_if(&key, |_, current| current.same_as(&pending));
        }
        tracing::debug!(target: "cache", "{}: invalidated all entries", self.name);
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.get(key).is_some_and(|p| p.is_pending())
    }

    pub fn is_ready(&self, key: &K) -> bool {
        self.get(key).is_some_and(|p| p.is_ready())
    }

    /// Handles for every entry, in no particular order.
    pub fn entries(&self) -> Vec<(K, Pending<V>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
