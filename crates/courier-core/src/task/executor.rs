//! TaskExecutor - 最新の実行だけを生かすエグゼキュータ
//!
//! `run` は追跡中の他の実行をすべて abort し、それらが finalize してから
//! factory を呼びます。返されるのは外側の wrapper で、内側のタスクとは
//! 結果の転送とキャンセルの委譲で繋がります。
//!
//! wrapper のキャンセルは、内側が終わるまで確定しません。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::handle::TaskHandle;
use super::settlement::Settlement;
use crate::domain::TaskId;
use crate::observability::ExecutorStat;

struct ExecutorShared<T, C> {
    processing: Mutex<HashMap<TaskId, TaskHandle<T, C>>>,
    stat: Mutex<ExecutorStat>,
}

impl<T, C> ExecutorShared<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    fn processing(&self) -> MutexGuard<'_, HashMap<TaskId, TaskHandle<T, C>>> {
        self.processing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stat(&self) -> MutexGuard<'_, ExecutorStat> {
        self.stat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn abort_all(&self, except: Option<TaskId>) {
        let tasks: Vec<TaskHandle<T, C>> = self
            .processing()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, task)| task.clone())
            .collect();
        for task in &tasks {
            if task.is_processing() {
                task.abort(None);
            }
        }
        for task in tasks {
            task.wait().await;
        }
    }
}

/// Executor with most-recent-wins semantics. `Clone` shares the tracked set.
pub struct TaskExecutor<T, C = ()> {
    shared: Arc<ExecutorShared<T, C>>,
}

impl<T, C> Clone for TaskExecutor<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, C> TaskExecutor<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ExecutorShared {
                processing: Mutex::new(HashMap::new()),
                stat: Mutex::new(ExecutorStat::default()),
            }),
        }
    }

    /// Supersede every tracked execution and start the one built by `factory`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn run<F>(&self, factory: F) -> TaskHandle<T, C>
    where
        F: FnOnce() -> TaskHandle<T, C> + Send + 'static,
    {
        let wrapper: TaskHandle<T, C> = TaskHandle::new();
        let id = wrapper.id();

        let on_cancel = Arc::downgrade(&self.shared);
        let on_finish = Arc::downgrade(&self.shared);
        wrapper
            .canceled(move |_| {
                if let Some(shared) = on_cancel.upgrade() {
                    shared.stat().canceled += 1;
                }
            })
            .finally(move || {
                if let Some(shared) = on_finish.upgrade() {
                    shared.processing().remove(&id);
                }
            });
        self.shared.processing().insert(id, wrapper.clone());

        let shared = Arc::downgrade(&self.shared);
        let task = wrapper.clone();
        tokio::spawn(async move {
            if task.is_canceling() {
                return;
            }
            let Some(executor) = shared.upgrade() else {
                return;
            };
            executor.abort_all(Some(id)).await;
            drop(executor);
            if task.is_canceling() {
                return;
            }
            start(&shared, &task, factory());
        });
        wrapper
    }

    /// Abort everything tracked and wait for it to finalize.
    pub async fn abort(&self) {
        self.shared.abort_all(None).await;
    }

    pub fn stat(&self) -> ExecutorStat {
        let actual = self.shared.processing().len();
        ExecutorStat {
            actual,
            ..*self.shared.stat()
        }
    }
}

fn start<T, C>(
    shared: &Weak<ExecutorShared<T, C>>,
    wrapper: &TaskHandle<T, C>,
    inner: TaskHandle<T, C>,
) where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    let counters = shared.clone();
    let forward = wrapper.clone();
    inner.when_settled(move |settled| {
        let executor = counters.upgrade();
        match settled {
            Settlement::Resolved(value) => {
                if let Some(executor) = &executor {
                    executor.stat().done += 1;
                }
                forward.resolve(value);
            }
            Settlement::Rejected(err) => {
                if let Some(executor) = &executor {
                    executor.stat().rejected += 1;
                }
                forward.reject(err);
            }
            Settlement::Cancelled(reason) => forward.cancel(reason),
        }
    });

    let target = inner.clone();
    let owner = wrapper.clone();
    let delegated = wrapper.delegate(move |reason| {
        if !target.is_processing() {
            owner.cancel(reason);
            return;
        }
        let owner = owner.clone();
        target.finally(move || owner.cancel(None));
        if !target.is_canceling() {
            target.abort(reason);
        }
    });
    if let Err(err) = delegated {
        inner.abort(None);
        wrapper.reject(err);
        return;
    }
    if wrapper.is_completed() {
        inner.abort(None);
    }
}

impl<T, C> Default for TaskExecutor<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
