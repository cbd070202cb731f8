//! SerialQueue - 1 つずつ、間隔を空けて実行するキュー
//!
//! 外部 API のレート制限を守るために、オペレーションを 1 本ずつ実行します。
//! 前のオペレーションの完了から `delay` が経つまで次は始まりません。
//!
//! # ライフサイクル
//! - `add`: 末尾に積む。アイドルなら drain タスクを起動
//! - drain: 先頭を取り出す → 待つ → 実行 → 完了時刻を記録 → 次へ
//! - `destroy`: 以降の `add` を拒否し、積まれている分が終わるまで待つ
//!
//! 失敗したオペレーションはログに残すだけで、キューは止まりません。

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::QueueConfig;
use crate::domain::{EntryId, QueueError, TaskError};
use crate::observability::QueueCounts;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::task::TaskHandle;

/// Zero-argument operation accepted by the queue.
pub type Operation = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

struct QueuedOperation {
    id: EntryId,
    alias: String,
    enqueued_at: DateTime<Utc>,
    operation: Operation,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedOperation>,
    working: bool,
    destroyed: bool,
    last_finished: Option<Instant>,
    processed: usize,
    failed: usize,
}

struct QueueShared {
    state: Mutex<QueueState>,
    idle_tx: watch::Sender<bool>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serialized, rate-limited operation queue. `Clone` shares the same queue.
#[derive(Clone)]
pub struct SerialQueue {
    shared: Arc<QueueShared>,
}

impl SerialQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        let (idle_tx, _) = watch::channel(true);
        let ids = Box::new(UlidGenerator::new(SharedClock(Arc::clone(&clock))));
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
                idle_tx,
                config,
                clock,
                ids,
            }),
        }
    }

    /// Append an operation; starts draining when the queue was idle.
    ///
    /// Must be called within a Tokio runtime.
    pub fn add<F>(
        &self,
        operation: F,
        id: Option<EntryId>,
        alias: Option<&str>,
    ) -> Result<EntryId, QueueError>
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let alias = alias
            .map(str::to_string)
            .unwrap_or_else(|| self.shared.config.default_alias.clone());
        let mut state = self.shared.lock();
        if state.destroyed {
            tracing::warn!(alias = %alias, "operation rejected by destroyed queue");
            return Err(QueueError::Destroyed(alias));
        }
        let id = id.unwrap_or_else(|| self.shared.ids.generate_entry_id());
        tracing::debug!(entry = %id, alias = %alias, "operation queued");
        state.pending.push_back(QueuedOperation {
            id,
            alias,
            enqueued_at: self.shared.clock.now(),
            operation: Box::pin(operation),
        });
        let start = !state.working;
        if start {
            state.working = true;
            self.shared.idle_tx.send_replace(false);
        }
        drop(state);

        if start {
            tokio::spawn(drain(Arc::clone(&self.shared)));
        }
        Ok(id)
    }

    /// Queue `operation` and observe it through a TaskHandle.
    ///
    /// Failures reject the handle without stopping the queue. Aborting the handle
    /// skips the operation, or drops it if it is already running.
    pub fn wait<T, F>(&self, operation: F) -> TaskHandle<T>
    where
        T: Clone + Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let handle: TaskHandle<T> = TaskHandle::new();
        let settle = handle.clone();
        let queued = async move {
            if settle.is_completed() {
                return Ok(());
            }
            let mut running = tokio::spawn(operation);
            tokio::select! {
                joined = &mut running => {
                    let result = joined.unwrap_or_else(|err| {
                        Err(TaskError::other(format!("queued operation panicked: {err}")))
                    });
                    match result {
                        Ok(value) => {
                            settle.resolve(value);
                            Ok(())
                        }
                        Err(err) => {
                            settle.reject(err.clone());
                            Err(err)
                        }
                    }
                }
                _ = settle.wait() => {
                    running.abort();
                    Ok(())
                }
            }
        };
        if let Err(err) = self.add(queued, None, None) {
            handle.reject(err.into());
        }
        handle
    }

    /// Refuse further additions and wait until the queued operations drained.
    pub async fn destroy(&self) {
        self.shared.lock().destroyed = true;
        let mut idle = self.shared.idle_tx.subscribe();
        // The sender lives in `shared`, so the channel cannot close here.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.shared.lock();
        QueueCounts {
            pending: state.pending.len(),
            processed: state.processed,
            failed: state.failed,
        }
    }

    pub fn is_working(&self) -> bool {
        self.shared.lock().working
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().destroyed
    }
}

async fn drain(shared: Arc<QueueShared>) {
    let delay = shared.config.delay();
    loop {
        let (entry, last_finished) = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(entry) => (entry, state.last_finished),
                None => {
                    state.working = false;
                    shared.idle_tx.send_replace(true);
                    return;
                }
            }
        };
        if let Some(last_finished) = last_finished {
            tokio::time::sleep_until(last_finished + delay).await;
        }

        let waited_ms = (shared.clock.now() - entry.enqueued_at).num_milliseconds();
        tracing::debug!(entry = %entry.id, alias = %entry.alias, waited_ms, "operation started");
        // Spawned so that a panicking operation cannot take the drain loop down.
        let result = tokio::spawn(entry.operation).await;

        let mut state = shared.lock();
        state.last_finished = Some(Instant::now());
        match result {
            Ok(Ok(())) => state.processed += 1,
            Ok(Err(err)) => {
                state.failed += 1;
                tracing::warn!(entry = %entry.id, alias = %entry.alias, error = %err, "queued operation failed");
            }
            Err(err) => {
                state.failed += 1;
                tracing::error!(entry = %entry.id, alias = %entry.alias, error = %err, "queued operation panicked");
            }
        }
    }
}

/// Lets the id generator share the queue's clock.
struct SharedClock(Arc<dyn Clock>);

impl Clock for SharedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.now()
    }
}
