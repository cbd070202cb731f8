//! SingleTaskTracker - 同時に 1 つだけ動くタスク
//!
//! 新しい `run` は実行中のタスクを abort し、それが finalize してから次を始めます。
//! 入れ替え中（aborting）の `run` は `TaskError::Aborting` で拒否されます。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::handle::TaskHandle;
use crate::domain::{TaskError, TaskId};

struct TrackerState<T, C> {
    running: Option<TaskHandle<T, C>>,
    aborting: bool,
}

type SharedState<T, C> = Mutex<TrackerState<T, C>>;

fn lock<T, C>(state: &SharedState<T, C>) -> MutexGuard<'_, TrackerState<T, C>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-flight tracker. `Clone` shares the same slot.
pub struct SingleTaskTracker<T, C = ()> {
    state: Arc<SharedState<T, C>>,
}

impl<T, C> Clone for SingleTaskTracker<T, C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, C> SingleTaskTracker<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                running: None,
                aborting: false,
            })),
        }
    }

    /// Start the task built by `factory`, superseding the current one.
    ///
    /// When idle, `factory` runs while the tracker is locked, so it must not call
    /// back into this tracker.
    pub async fn run<F>(&self, factory: F) -> Result<TaskHandle<T, C>, TaskError>
    where
        F: FnOnce() -> TaskHandle<T, C>,
    {
        let current = {
            let mut state = lock(&self.state);
            if state.aborting {
                return Err(TaskError::Aborting);
            }
            match state.running.clone() {
                Some(current) => {
                    state.aborting = true;
                    current
                }
                None => {
                    let started = factory();
                    state.running = Some(started.clone());
                    drop(state);
                    self.track(&started);
                    return Ok(started);
                }
            }
        };

        tracing::debug!(task = %current.id(), "superseding running task");
        current.abort(None);
        current.wait().await;

        let started = factory();
        {
            let mut state = lock(&self.state);
            state.aborting = false;
            state.running = Some(started.clone());
        }
        self.track(&started);
        Ok(started)
    }

    /// True while a task runs or is being replaced.
    pub fn working(&self) -> bool {
        let state = lock(&self.state);
        state.running.is_some() || state.aborting
    }

    /// Abort the running task and wait for it to finalize.
    pub async fn abort(&self) {
        let current = lock(&self.state).running.clone();
        if let Some(current) = current {
            current.abort(None);
            current.wait().await;
        }
    }

    fn track(&self, handle: &TaskHandle<T, C>) {
        let weak: Weak<SharedState<T, C>> = Arc::downgrade(&self.state);
        let id = handle.id();
        handle.when_settled(move |_| {
            if let Some(state) = weak.upgrade() {
                release(&state, id);
            }
        });
    }
}

fn release<T, C>(state: &SharedState<T, C>, id: TaskId)
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    let mut state = lock(state);
    if state.running.as_ref().is_some_and(|running| running.id() == id) {
        state.running = None;
    }
}

impl<T, C> Default for SingleTaskTracker<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
