//! JobsTracker - まとめて abort できるタスクの集合
//!
//! 登録したタスクは finalize 時に自動で外れます。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::handle::TaskHandle;
use crate::domain::TaskId;

type Jobs<T, C> = Mutex<HashMap<TaskId, TaskHandle<T, C>>>;

pub struct JobsTracker<T, C = ()> {
    jobs: Arc<Jobs<T, C>>,
}

impl<T, C> Clone for JobsTracker<T, C> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
        }
    }
}

impl<T, C> JobsTracker<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TaskHandle<T, C>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, job: &TaskHandle<T, C>) -> &Self {
        let id = job.id();
        self.lock().insert(id, job.clone());
        let jobs = Arc::downgrade(&self.jobs);
        job.when_settled(move |_| {
            if let Some(jobs) = jobs.upgrade() {
                jobs.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
            }
        });
        self
    }

    /// Abort every active job and wait until all of them are finalized.
    pub async fn abort(&self, reason: Option<C>) {
        let jobs: Vec<TaskHandle<T, C>> = self.lock().values().cloned().collect();
        if jobs.is_empty() {
            return;
        }
        tracing::debug!(jobs = jobs.len(), "aborting tracked jobs");
        for job in &jobs {
            if job.is_processing() {
                job.abort(reason.clone());
            }
        }
        for job in jobs {
            job.wait().await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T, C> Default for JobsTracker<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
