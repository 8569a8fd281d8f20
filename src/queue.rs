use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct QueueState {
    queued: VecDeque<PathBuf>,
    /// Queued plus in-flight paths; a path stays here until `finish`.
    pending: HashSet<PathBuf>,
}

/// FIFO of files waiting to be checked.
///
/// Safe to push from any number of threads. A path already waiting or being
/// checked is not queued a second time.
#[derive(Debug, Default)]
pub struct CheckQueue {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl CheckQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state is a plain collection, still consistent after a panic elsewhere.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `path` unless it is already pending. Never blocks on the worker.
    /// Returns whether the path was added.
    pub fn push(&self, path: PathBuf) -> bool {
        let mut state = self.lock();
        if !state.pending.insert(path.clone()) {
            return false;
        }
        state.queued.push_back(path);
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Take the next path, waiting up to `timeout` for one to arrive.
    /// The path stays pending until [`finish`](Self::finish) is called.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PathBuf> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(path) = state.queued.pop_front() {
                return Some(path);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Mark an in-flight path as done so it may be queued again.
    pub fn finish(&self, path: &Path) {
        let mut state = self.lock();
        state.pending.remove(path);
        drop(state);
        self.changed.notify_all();
    }

    /// Drop every path still waiting. In-flight paths are left alone.
    /// Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let abandoned: Vec<PathBuf> = state.queued.drain(..).collect();
        for path in &abandoned {
            state.pending.remove(path);
        }
        drop(state);
        self.changed.notify_all();
        abandoned.len()
    }

    /// Number of paths waiting (not counting one in flight).
    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing waiting and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Block until the queue is idle or `timeout` passes. Returns whether it
    /// became idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !state.pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }
}
