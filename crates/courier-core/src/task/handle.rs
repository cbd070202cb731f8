//! TaskHandle - キャンセル可能な非同期タスク
//!
//! 1 つの中断可能な作業単位を表します。生成側は `resolve` / `reject` / `cancel`
//! で結果を確定し、利用側は `then` / `catch` / `canceled` / `finally` で継続を
//! 登録するか、`wait().await`（または `handle.await`）で `Settlement` を受け取ります。
//!
//! # 状態
//! - `Pending` から `Resolved` / `Rejected` / `Cancelled` のどれか 1 つへ一度だけ遷移
//! - 委譲先がある場合の `abort` は `Cancelling` を経由し、委譲先が `cancel` するまで確定しない
//! - `finalized` は終端への遷移後に一度だけ true になり、その後は何も変化しない
//!
//! # bind
//! bind された相手は `Weak` で参照します。遷移は `bound_call` 付きで相手に一度だけ
//! 伝播し、相手からは再伝播しません。キャンセルの委譲先は連結成分で 1 つの
//! `DelegationSlot` を共有します。
//!
//! # ロック
//! 内部状態は短い同期区間だけロックし、ユーザーのコールバックはロックの外で
//! `catch_unwind` で隔離して呼びます。1 つのコールバックの panic は他に影響しません。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::watch;

use super::settlement::Settlement;
use super::slot::{Delegation, DelegationSlot};
use crate::domain::{TaskError, TaskId, TaskState};

type Resolver<T> = Box<dyn FnOnce(&T) + Send>;
type Rejector = Box<dyn FnOnce(&TaskError) + Send>;
type Canceler<C> = Box<dyn FnOnce(Option<&C>) + Send>;
type Finisher = Box<dyn FnOnce() + Send>;
type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

enum Status<T, C> {
    Pending,
    Cancelling,
    Resolved(T),
    Rejected(TaskError),
    Cancelled(Option<C>),
}

impl<T: Clone, C: Clone> Status<T, C> {
    fn state(&self) -> TaskState {
        match self {
            Status::Pending => TaskState::Pending,
            Status::Cancelling => TaskState::Cancelling,
            Status::Resolved(_) => TaskState::Resolved,
            Status::Rejected(_) => TaskState::Rejected,
            Status::Cancelled(_) => TaskState::Cancelled,
        }
    }

    fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    fn settlement(&self) -> Option<Settlement<T, C>> {
        match self {
            Status::Resolved(value) => Some(Settlement::Resolved(value.clone())),
            Status::Rejected(err) => Some(Settlement::Rejected(err.clone())),
            Status::Cancelled(reason) => Some(Settlement::Cancelled(reason.clone())),
            Status::Pending | Status::Cancelling => None,
        }
    }
}

struct Inner<T, C> {
    id: TaskId,
    id_adopted: bool,
    status: Status<T, C>,
    finalized: bool,
    resolvers: Vec<Resolver<T>>,
    rejectors: Vec<Rejector>,
    cancelers: Vec<Canceler<C>>,
    finishes: Vec<Finisher>,
    handlers: HashMap<String, Vec<EventHandler>>,
    bound: Vec<Weak<Shared<T, C>>>,
    slot: Arc<DelegationSlot<C>>,
}

impl<T, C> Inner<T, C> {
    /// A peer settled the bound group; a cancellation forwarded through the
    /// shared delegation no longer holds this handle back.
    fn withdraw_for_peer(&mut self, bound_call: bool) {
        if bound_call && matches!(self.status, Status::Cancelling) {
            self.status = Status::Pending;
        }
    }
}

struct Shared<T, C> {
    inner: Mutex<Inner<T, C>>,
    finalized_tx: watch::Sender<bool>,
}

impl<T, C> Shared<T, C> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancelable handle to one unit of asynchronous work.
///
/// `Clone` は同じタスクへの参照を増やすだけです。
pub struct TaskHandle<T, C = ()> {
    shared: Arc<Shared<T, C>>,
}

impl<T, C> Clone for TaskHandle<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, C> TaskHandle<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    pub fn new() -> Self {
        let (finalized_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    id: TaskId::generate(),
                    id_adopted: false,
                    status: Status::Pending,
                    finalized: false,
                    resolvers: Vec::new(),
                    rejectors: Vec::new(),
                    cancelers: Vec::new(),
                    finishes: Vec::new(),
                    handlers: HashMap::new(),
                    bound: Vec::new(),
                    slot: Arc::new(DelegationSlot::new()),
                }),
                finalized_tx,
            }),
        }
    }

    pub fn resolved(value: T) -> Self {
        let handle = Self::new();
        handle.resolve(value);
        handle
    }

    pub fn rejected(err: TaskError) -> Self {
        let handle = Self::new();
        handle.reject(err);
        handle
    }

    /// Drive `future` on the Tokio runtime and settle the handle with its output.
    ///
    /// Cancelling the handle aborts the spawned task. Must be called within a runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let handle = Self::new();
        let settle = handle.clone();
        let join = tokio::spawn(async move {
            match future.await {
                Ok(value) => settle.resolve(value),
                Err(err) => settle.reject(err),
            }
        });
        handle.canceled(move |_| join.abort());
        handle
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, C>> {
        self.shared.lock()
    }

    // ------------------------------------------------------------------
    // identity / state
    // ------------------------------------------------------------------

    pub fn id(&self) -> TaskId {
        self.lock().id
    }

    /// Replace the generated id with a caller-supplied one. Allowed once.
    pub fn adopt_id(&self, id: TaskId) -> bool {
        let mut inner = self.lock();
        if inner.id_adopted {
            return false;
        }
        inner.id = id;
        inner.id_adopted = true;
        true
    }

    pub fn state(&self) -> TaskState {
        self.lock().status.state()
    }

    pub fn is_processing(&self) -> bool {
        self.state() == TaskState::Pending
    }

    pub fn is_completed(&self) -> bool {
        !self.is_processing()
    }

    pub fn is_canceling(&self) -> bool {
        matches!(self.state(), TaskState::Cancelling | TaskState::Cancelled)
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    pub fn settlement(&self) -> Option<Settlement<T, C>> {
        self.lock().status.settlement()
    }

    /// Wait until the handle is finalized.
    pub async fn wait(&self) -> Settlement<T, C> {
        let mut rx = self.shared.finalized_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once finalized.
        let _ = rx.wait_for(|finalized| *finalized).await;
        match self.settlement() {
            Some(settlement) => settlement,
            None => Settlement::Rejected(TaskError::other("task finalized without settlement")),
        }
    }

    // ------------------------------------------------------------------
    // continuations
    // ------------------------------------------------------------------

    pub fn then<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut inner = self.lock();
        if !inner.finalized && !inner.status.is_settled() {
            inner.resolvers.push(Box::new(callback));
        }
        self
    }

    pub fn catch<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&TaskError) + Send + 'static,
    {
        let mut inner = self.lock();
        if !inner.finalized && !inner.status.is_settled() {
            inner.rejectors.push(Box::new(callback));
        }
        self
    }

    pub fn canceled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(Option<&C>) + Send + 'static,
    {
        let mut inner = self.lock();
        if !inner.finalized && !inner.status.is_settled() {
            inner.cancelers.push(Box::new(callback));
        }
        self
    }

    pub fn finally<F>(&self, callback: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.lock();
        if !inner.finalized {
            inner.finishes.push(Box::new(callback));
        }
        self
    }

    /// Run `callback` with the settlement once the handle is finalized.
    ///
    /// Unlike the other continuations this also fires for an already finalized
    /// handle, immediately on the calling thread.
    pub fn when_settled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(Settlement<T, C>) + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.finalized {
            let settled = inner.status.settlement();
            drop(inner);
            if let Some(settled) = settled {
                callback(settled);
            }
            return self;
        }
        let weak = Arc::downgrade(&self.shared);
        inner.finishes.push(Box::new(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let settled = shared.lock().status.settlement();
            if let Some(settled) = settled {
                callback(settled);
            }
        }));
        self
    }

    /// Chain a dependent handle.
    ///
    /// The downstream handle settles from this one, and its cancellation is
    /// delegated back here, so aborting the tail of a chain reaches its head.
    pub fn map<U, F>(&self, transform: F) -> TaskHandle<U, C>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> Result<U, TaskError> + Send + 'static,
    {
        let downstream = TaskHandle::<U, C>::new();
        let mut inner = self.lock();
        if inner.finalized || inner.status.is_settled() {
            let settled = inner.status.settlement();
            drop(inner);
            match settled {
                Some(Settlement::Resolved(value)) => match transform(&value) {
                    Ok(mapped) => downstream.resolve(mapped),
                    Err(err) => downstream.reject(err),
                },
                Some(Settlement::Rejected(err)) => downstream.reject(err),
                Some(Settlement::Cancelled(reason)) => downstream.cancel(reason),
                None => {}
            }
            return downstream;
        }
        let on_resolve = downstream.clone();
        inner.resolvers.push(Box::new(move |value: &T| {
            on_resolve.try_to_stop_cancellation();
            match transform(value) {
                Ok(mapped) => on_resolve.resolve(mapped),
                Err(err) => on_resolve.reject(err),
            }
        }));
        let on_reject = downstream.clone();
        inner.rejectors.push(Box::new(move |err: &TaskError| {
            on_reject.try_to_stop_cancellation();
            on_reject.reject(err.clone());
        }));
        let on_cancel = downstream.clone();
        inner.cancelers.push(Box::new(move |reason: Option<&C>| {
            on_cancel.cancel(reason.cloned());
        }));
        drop(inner);

        let upstream = self.clone();
        if let Err(err) = downstream.delegate(move |reason| {
            upstream.abort(reason);
        }) {
            downstream.reject(err);
        }
        downstream
    }

    // ------------------------------------------------------------------
    // named events
    // ------------------------------------------------------------------

    /// Subscribe to a progress event. Empty or blank names are ignored.
    pub fn on<F>(&self, event: &str, handler: F) -> &Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if event.trim().is_empty() {
            return self;
        }
        self.lock()
            .handlers
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Invoke every handler of `event` synchronously.
    ///
    /// A panicking handler rejects the task.
    pub fn emit(&self, event: &str, payload: &Value) {
        let (id, handlers) = {
            let inner = self.lock();
            (inner.id, inner.handlers.get(event).cloned().unwrap_or_default())
        };
        for handler in handlers {
            if let Err(message) = isolate(id, "event", || handler(payload)) {
                self.reject(TaskError::other(format!(
                    "task is rejected, because handler of event \"{event}\" failed: {message}"
                )));
            }
        }
    }

    // ------------------------------------------------------------------
    // cancellation
    // ------------------------------------------------------------------

    /// Request cancellation.
    ///
    /// No-op once settled or while a forwarded cancellation is in flight. With a
    /// delegation anywhere in the bound group the reason is forwarded and the
    /// handle stays `Cancelling` until the delegate settles it.
    pub fn abort(&self, reason: Option<C>) -> &Self {
        let delegation = {
            let mut inner = self.lock();
            if inner.finalized || !matches!(inner.status, Status::Pending) {
                return self;
            }
            let delegation = inner.slot.current();
            if delegation.is_some() {
                inner.status = Status::Cancelling;
            }
            delegation
        };
        match delegation {
            Some(delegation) => {
                let id = self.id();
                tracing::debug!(task = %id, "cancellation forwarded to delegation");
                let _ = isolate(id, "delegation", || delegation(reason));
            }
            None => self.settle_cancelled(reason, false),
        }
        self
    }

    /// Register the delegation for this handle's bound group.
    pub fn delegate<F>(&self, delegation: F) -> Result<&Self, TaskError>
    where
        F: Fn(Option<C>) + Send + Sync + 'static,
    {
        let inner = self.lock();
        if inner.finalized {
            return Ok(self);
        }
        let delegation: Delegation<C> = Arc::new(delegation);
        inner.slot.install(delegation)?;
        drop(inner);
        Ok(self)
    }

    /// Withdraw an in-flight cancellation so a late result can still settle the handle.
    ///
    /// Returns false once the handle is already cancelled.
    pub fn try_to_stop_cancellation(&self) -> bool {
        let mut inner = self.lock();
        match inner.status {
            Status::Cancelled(_) => false,
            Status::Cancelling => {
                inner.status = Status::Pending;
                true
            }
            _ => true,
        }
    }

    // ------------------------------------------------------------------
    // binding
    // ------------------------------------------------------------------

    /// Link two handles so that settling either one settles the other.
    pub fn bind(&self, other: &Self) -> Result<&Self, TaskError> {
        self.bind_with(other, false)
    }

    /// `bound_call` marks the symmetric half of a bind, which must not recurse.
    pub fn bind_with(&self, other: &Self, bound_call: bool) -> Result<&Self, TaskError> {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return Ok(self);
        }
        if !bound_call {
            self.merge_delegation(other)?;
        }
        {
            let mut inner = self.lock();
            let target = Arc::as_ptr(&other.shared);
            if !inner.bound.iter().any(|peer| std::ptr::eq(peer.as_ptr(), target)) {
                inner.bound.push(Arc::downgrade(&other.shared));
            }
        }
        if !bound_call {
            other.bind_with(self, true)?;
        }
        Ok(self)
    }

    fn merge_delegation(&self, other: &Self) -> Result<(), TaskError> {
        let mine = Arc::clone(&self.lock().slot);
        let theirs = Arc::clone(&other.lock().slot);
        if Arc::ptr_eq(&mine, &theirs) {
            return Ok(());
        }
        let keep = match (mine.is_set(), theirs.is_set()) {
            (true, true) => return Err(TaskError::DoubleDelegation),
            (false, true) => theirs,
            _ => mine,
        };
        for member in self.component().into_iter().chain(other.component()) {
            member.lock().slot = Arc::clone(&keep);
        }
        Ok(())
    }

    /// Every handle reachable from this one through bindings, including itself.
    fn component(&self) -> Vec<Self> {
        let mut seen: Vec<Self> = vec![self.clone()];
        let mut cursor = 0;
        while cursor < seen.len() {
            let peers: Vec<Arc<Shared<T, C>>> = seen[cursor]
                .lock()
                .bound
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            for shared in peers {
                if !seen.iter().any(|known| Arc::ptr_eq(&known.shared, &shared)) {
                    seen.push(Self { shared });
                }
            }
            cursor += 1;
        }
        seen
    }

    fn peers(inner: &Inner<T, C>, bound_call: bool) -> Vec<Self> {
        if bound_call {
            return Vec::new();
        }
        inner
            .bound
            .iter()
            .filter_map(Weak::upgrade)
            .map(|shared| Self { shared })
            .collect()
    }

    // ------------------------------------------------------------------
    // settlement
    // ------------------------------------------------------------------

    pub fn resolve(&self, value: T) {
        self.settle_resolved(value, false);
    }

    pub fn reject(&self, err: TaskError) {
        self.settle_rejected(err, false);
    }

    /// Cancel locally. Unlike `resolve`, this also completes a `Cancelling` handle.
    pub fn cancel(&self, reason: Option<C>) {
        self.settle_cancelled(reason, false);
    }

    fn settle_resolved(&self, value: T, bound_call: bool) {
        let (id, resolvers, peers) = {
            let mut inner = self.lock();
            inner.handlers.clear();
            inner.withdraw_for_peer(bound_call);
            if inner.finalized || !matches!(inner.status, Status::Pending) {
                return;
            }
            inner.status = Status::Resolved(value.clone());
            (
                inner.id,
                std::mem::take(&mut inner.resolvers),
                Self::peers(&inner, bound_call),
            )
        };
        for resolver in resolvers {
            let _ = isolate(id, "then", || resolver(&value));
        }
        for peer in peers {
            peer.settle_resolved(value.clone(), true);
        }
        self.finish();
    }

    fn settle_rejected(&self, err: TaskError, bound_call: bool) {
        let (id, rejectors, peers) = {
            let mut inner = self.lock();
            inner.handlers.clear();
            inner.withdraw_for_peer(bound_call);
            if inner.finalized || !matches!(inner.status, Status::Pending) {
                return;
            }
            inner.status = Status::Rejected(err.clone());
            (
                inner.id,
                std::mem::take(&mut inner.rejectors),
                Self::peers(&inner, bound_call),
            )
        };
        for rejector in rejectors {
            let _ = isolate(id, "catch", || rejector(&err));
        }
        for peer in peers {
            peer.settle_rejected(err.clone(), true);
        }
        self.finish();
    }

    fn settle_cancelled(&self, reason: Option<C>, bound_call: bool) {
        let (id, cancelers, peers) = {
            let mut inner = self.lock();
            inner.handlers.clear();
            if inner.finalized || inner.status.is_settled() {
                return;
            }
            inner.status = Status::Cancelled(reason.clone());
            (
                inner.id,
                std::mem::take(&mut inner.cancelers),
                Self::peers(&inner, bound_call),
            )
        };
        for canceler in cancelers {
            let _ = isolate(id, "canceled", || canceler(reason.as_ref()));
        }
        for peer in peers {
            peer.settle_cancelled(reason.clone(), true);
        }
        self.finish();
    }

    fn finish(&self) {
        let (id, finishes, leftovers, slot) = {
            let mut inner = self.lock();
            if inner.finalized {
                return;
            }
            inner.finalized = true;
            inner.handlers.clear();
            let leftovers = (
                std::mem::take(&mut inner.resolvers),
                std::mem::take(&mut inner.rejectors),
                std::mem::take(&mut inner.cancelers),
            );
            (
                inner.id,
                std::mem::take(&mut inner.finishes),
                leftovers,
                Arc::clone(&inner.slot),
            )
        };
        // Unused continuations and the delegation may hold clones of other
        // handles; drop them outside the lock.
        drop(leftovers);
        drop(slot.clear());
        self.shared.finalized_tx.send_replace(true);
        for finish in finishes {
            let _ = isolate(id, "finally", finish);
        }
    }
}

impl<T, C> Default for TaskHandle<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> fmt::Debug for TaskHandle<T, C>
where
    T: Clone,
    C: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("TaskHandle")
            .field("id", &inner.id)
            .field("state", &inner.status.state())
            .field("finalized", &inner.finalized)
            .finish()
    }
}

impl<T, C> IntoFuture for TaskHandle<T, C>
where
    T: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    type Output = Settlement<T, C>;
    type IntoFuture = Pin<Box<dyn Future<Output = Settlement<T, C>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

fn isolate(task: TaskId, stage: &'static str, callback: impl FnOnce()) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(callback)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(task = %task, stage, "callback panicked: {message}");
        message
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
