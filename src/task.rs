// src/task.rs

//! Task lifecycle state machine.
//!
//! A [`Task`] is a small handle (`Arc`-backed) around [`Inner`], which owns
//! everything the executor, timer heap, and dependants/triggered peers need
//! to drive a task from `Created` through to a terminal state. Dependants
//! and triggered peers are linked with `Weak` back-references so a
//! producer never keeps its consumers alive past their own holders (see
//! `DESIGN.md`).
//!
//! `Task` itself never computes a value — it only tracks readiness and
//! runs an opaque `FnOnce`. [`crate::future::Future`] wraps a `Task` to add
//! a typed result slot; see that module for how the two compose.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Instant;

use crate::executor::Shared;

/// A task's failure payload, shared so that every `get()` caller after the
/// first observes the same value. Built either from the user function's
/// `Err` or from a caught panic (see `executor::worker::run_task`).
pub type Failure = Arc<anyhow::Error>;

/// The seven lifecycle states. Transitions are one-directional; no state is
/// ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Timered,
    Pending,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

fn is_unstarted(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Created | TaskStatus::Timered)
}

fn is_finished_status(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
    )
}

/// Error surfaced to [`crate::future::Future::get`]. Distinct from
/// [`crate::errors::TaskGraphError`]: that type is for executor/task
/// construction misuse, this one is what a *consumer* of a task's result
/// observes.
#[derive(Debug)]
pub enum GetError {
    Failed(Failure),
    Canceled,
}

impl std::fmt::Display for GetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GetError::Failed(err) => write!(f, "task failed: {err}"),
            GetError::Canceled => write!(f, "task was canceled"),
        }
    }
}

impl std::error::Error for GetError {}

struct State {
    status: TaskStatus,
    error: Option<Failure>,
    dependency_count: Option<usize>,
    dependants: Vec<Weak<Inner>>,
    trigger: Option<bool>,
    triggered: Vec<Weak<Inner>>,
    time_trigger: Option<Instant>,
    executor: Option<Weak<Shared>>,
    body: Option<Box<dyn FnOnce() -> Result<(), Failure> + Send>>,
}

/// Shared task state. Never exposed directly; always reached through the
/// cheap `Arc`-cloneable [`Task`] handle.
pub(crate) struct Inner {
    state: Mutex<State>,
    finished_cv: Condvar,
    // Extra callbacks run once, after `finished_cv` is notified and before
    // dependants/triggered are walked. `Future<T>` registers one here to
    // wake its own result condvar independently of plain `wait()` callers
    // (design note: two wait channels, both notified on finish).
    hooks: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl Inner {
    fn new(body: Box<dyn FnOnce() -> Result<(), Failure> + Send>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                status: TaskStatus::Created,
                error: None,
                dependency_count: None,
                dependants: Vec::new(),
                trigger: None,
                triggered: Vec::new(),
                time_trigger: None,
                executor: None,
                body: Some(body),
            }),
            finished_cv: Condvar::new(),
            hooks: Mutex::new(Vec::new()),
        })
    }

    fn can_submit(state: &State) -> bool {
        is_unstarted(state.status)
            && state.executor.as_ref().and_then(Weak::upgrade).is_some()
            && state.dependency_count.unwrap_or(0) == 0
            && state.trigger.unwrap_or(true)
            && !(state.dependency_count.is_none()
                && state.trigger.is_none()
                && state.time_trigger.is_some())
    }

    /// Moves `Created`/`Timered` -> `Pending` and hands the task to the
    /// executor's ready queue, if readiness holds. Takes the state lock
    /// itself; callers that already hold it must use
    /// [`Self::try_submit_locked`] instead to avoid a reentrant deadlock.
    fn try_submit(self: &Arc<Self>) {
        let state = self.state.lock().unwrap();
        self.try_submit_locked(state);
    }

    /// Same as [`Self::try_submit`], but takes ownership of an
    /// already-held guard. The guard is dropped before the executor is
    /// called, honoring the rule that a task's own lock is never held
    /// while calling into its executor or peers.
    fn try_submit_locked(self: &Arc<Self>, mut state: MutexGuard<'_, State>) {
        if !Self::can_submit(&state) {
            return;
        }
        state.status = TaskStatus::Pending;
        let executor = state.executor.clone();
        drop(state);

        if let Some(shared) = executor.and_then(|w| w.upgrade()) {
            shared.add_to_do(Task { inner: self.clone() });
        }
    }

    fn submit_timer(self: &Arc<Self>) {
        let (shared, deadline) = {
            let mut state = self.state.lock().unwrap();
            match (state.status, state.time_trigger) {
                (TaskStatus::Created, Some(at)) => {
                    state.status = TaskStatus::Timered;
                    (state.executor.clone().and_then(|w| w.upgrade()), Some(at))
                }
                _ => (None, None),
            }
        };
        if let (Some(shared), Some(deadline)) = (shared, deadline) {
            shared.push_timer(deadline, Task { inner: self.clone() });
        }
    }

    /// Binds this task to an executor exactly once. Returns `false` if
    /// already bound (a programmer error — binding twice is a misuse,
    /// asserted in debug builds by the caller).
    pub(crate) fn set_executor(self: &Arc<Self>, executor: Weak<Shared>) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.executor.is_some() {
                return false;
            }
            state.executor = Some(executor);
        }
        self.submit_timer();
        self.try_submit();
        true
    }

    fn add_dependency(self: &Arc<Self>, dep: &Arc<Inner>) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(
            is_unstarted(state.status),
            "addDependency called on an already-started task"
        );
        if dep.add_dependant(self) {
            state.dependency_count = Some(state.dependency_count.unwrap_or(0) + 1);
        }
    }

    fn add_trigger(self: &Arc<Self>, dep: &Arc<Inner>) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(
            is_unstarted(state.status),
            "addTrigger called on an already-started task"
        );
        if state.trigger.is_none() {
            state.trigger = Some(false);
        }
        if !dep.add_triggered(self) {
            state.trigger = Some(true);
            self.try_submit_locked(state);
        }
    }

    fn set_time_trigger(&self, at: Instant) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(
            is_unstarted(state.status),
            "setTimeTrigger called on an already-started task"
        );
        state.time_trigger = Some(at);
    }

    /// Registers `dependant` as waiting on this task, unless this task has
    /// already finished (in which case ordering is preserved some other
    /// way: a finished task can't un-finish, so the caller must treat a
    /// `false` return as "already satisfied").
    fn add_dependant(&self, dependant: &Arc<Inner>) -> bool {
        let mut state = self.state.lock().unwrap();
        if is_finished_status(state.status) {
            false
        } else {
            state.dependants.push(Arc::downgrade(dependant));
            true
        }
    }

    fn add_triggered(&self, triggered: &Arc<Inner>) -> bool {
        let mut state = self.state.lock().unwrap();
        if is_finished_status(state.status) {
            false
        } else {
            state.triggered.push(Arc::downgrade(triggered));
            true
        }
    }

    fn remove_dependency(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(
            state.dependency_count.is_some(),
            "removeDependency called on a task with no dependency count"
        );
        let count = state.dependency_count.unwrap_or(0);
        debug_assert!(count > 0, "dependency count underflow");
        if count == 0 {
            return;
        }
        state.dependency_count = Some(count - 1);
        if count - 1 == 0 {
            self.try_submit_locked(state);
        }
    }

    fn trigger(self: &Arc<Self>) {
        let state = self.state.lock().unwrap();
        let mut state = state;
        state.trigger = Some(true);
        self.try_submit_locked(state);
    }

    /// Public cancel: legal only from `Created`/`Timered`, a no-op from any
    /// other state, including `Pending` — a queued task is
    /// only force-cancelled internally by the executor (see
    /// [`Self::cancel_pending`]), not through this API.
    pub(crate) fn cancel(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if is_unstarted(state.status) {
            state.status = TaskStatus::Canceled;
            drop(state);
            self.finish();
        }
    }

    /// Internal-only transition for the `Pending -> Canceled` edge: an
    /// executor rejecting a queued task during shutdown. Distinct from
    /// [`Self::cancel`], which never acts on a `Pending` task.
    pub(crate) fn cancel_pending(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if state.status == TaskStatus::Pending {
            state.status = TaskStatus::Canceled;
            drop(state);
            self.finish();
        }
    }

    /// Internal-only transition fired by the timer heap: the
    /// `Timered -> Pending` edge, "deadline fires". Distinct from
    /// [`Self::try_submit`]: a bare time-trigger task is never ready by
    /// the ordinary readiness predicate (see `can_submit`'s degenerate
    /// case), so the timer dispatcher must force it into the queue
    /// directly once its deadline has elapsed.
    pub(crate) fn fire_timer(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if state.status == TaskStatus::Timered {
            state.status = TaskStatus::Pending;
            let executor = state.executor.clone();
            drop(state);
            if let Some(shared) = executor.and_then(|w| w.upgrade()) {
                shared.add_to_do(Task { inner: self.clone() });
            }
        }
    }

    pub(crate) fn set_in_progress(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock().unwrap();
        if matches!(state.status, TaskStatus::Pending | TaskStatus::Timered) {
            state.status = TaskStatus::InProgress;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_completed(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            state.status = TaskStatus::Completed;
        }
        self.finish();
    }

    pub(crate) fn set_failed(self: &Arc<Self>, err: Failure) {
        {
            let mut state = self.state.lock().unwrap();
            state.error = Some(err);
            state.status = TaskStatus::Failed;
        }
        self.finish();
    }

    pub(crate) fn take_body(&self) -> Option<Box<dyn FnOnce() -> Result<(), Failure> + Send>> {
        self.state.lock().unwrap().body.take()
    }

    pub(crate) fn add_finish_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.hooks.lock().unwrap().push(hook);
    }

    /// Notifies waiters, then walks dependants and triggered peers.
    /// Strong references are taken through the weak back-reference list
    /// (skipping any target already dropped); the walk happens without
    /// holding this task's own lock, since `remove_dependency`/`trigger`
    /// on a peer re-enter that peer's lock.
    fn finish(self: &Arc<Self>) {
        let (dependants, triggered) = {
            let state = self.state.lock().unwrap();
            (state.dependants.clone(), state.triggered.clone())
        };

        self.finished_cv.notify_all();
        for hook in self.hooks.lock().unwrap().iter() {
            hook();
        }

        for dependant in dependants {
            if let Some(dependant) = dependant.upgrade() {
                dependant.remove_dependency();
            }
        }
        for triggered in triggered {
            if let Some(triggered) = triggered.upgrade() {
                triggered.trigger();
            }
        }
    }

    fn wait(&self) {
        let state = self.state.lock().unwrap();
        let _ = self
            .finished_cv
            .wait_while(state, |s| !is_finished_status(s.status))
            .unwrap();
    }

    fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    fn error(&self) -> Option<Failure> {
        self.state.lock().unwrap().error.clone()
    }
}

/// A cheap, `Clone`-able handle to a task. This is the public surface of
/// the public Task API; [`crate::future::Future`] derefs to it.
#[derive(Clone)]
pub struct Task {
    pub(crate) inner: Arc<Inner>,
}

impl Task {
    pub(crate) fn new_with_body(body: Box<dyn FnOnce() -> Result<(), Failure> + Send>) -> Self {
        Task {
            inner: Inner::new(body),
        }
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn add_dependency(&self, dep: &Task) {
        self.inner.add_dependency(&dep.inner);
    }

    pub fn add_trigger(&self, dep: &Task) {
        self.inner.add_trigger(&dep.inner);
    }

    pub fn set_time_trigger(&self, at: Instant) {
        self.inner.set_time_trigger(at);
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn wait(&self) {
        self.inner.wait();
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.status()
    }

    pub fn is_completed(&self) -> bool {
        self.status() == TaskStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status() == TaskStatus::Failed
    }

    pub fn is_canceled(&self) -> bool {
        self.status() == TaskStatus::Canceled
    }

    pub fn is_finished(&self) -> bool {
        is_finished_status(self.status())
    }

    pub fn get_error(&self) -> Option<Failure> {
        self.inner.error()
    }

    /// Binds this task to an executor exactly once. See
    /// [`Inner::set_executor`]; exposed here so `executor::Executor::submit`
    /// doesn't need to reach into `inner` directly.
    pub(crate) fn bind_executor(&self, executor: Weak<crate::executor::Shared>) -> bool {
        self.inner.set_executor(executor)
    }

    /// Force-cancels a still-`Pending` task (executor-shutdown rejection,
    /// the `Pending -> Canceled` edge). Never used on a task the caller
    /// cancelled themselves; see [`Self::cancel`] for that path.
    pub(crate) fn cancel_pending(&self) {
        self.inner.cancel_pending();
    }

    /// Forces a `Timered` task into the ready queue once its deadline has
    /// elapsed, bypassing the ordinary readiness predicate (see
    /// [`Inner::fire_timer`]).
    pub(crate) fn fire_timer(&self) {
        self.inner.fire_timer();
    }

    pub(crate) fn set_in_progress(&self) -> bool {
        self.inner.set_in_progress()
    }

    pub(crate) fn set_completed(&self) {
        self.inner.set_completed();
    }

    pub(crate) fn set_failed(&self, err: Failure) {
        self.inner.set_failed(err);
    }

    /// Runs this task's body, catching a panic and turning it into the
    /// same opaque failure payload a returned `Err` would produce. Workers
    /// call this exactly once, after `set_in_progress` and before
    /// `set_completed`/`set_failed`.
    pub(crate) fn run_body(&self) -> Result<(), Failure> {
        let body = self
            .inner
            .take_body()
            .expect("run_body called on a task with no body (already run, or never had one)");
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)) {
            Ok(result) => result,
            Err(payload) => Err(Arc::new(anyhow::anyhow!(panic_message(payload)))),
        }
    }

    /// Registers a callback invoked once when this task reaches a terminal
    /// state, after `wait()`'s condvar is notified but before dependants
    /// and triggered peers are walked. [`crate::future::Future`] uses this
    /// to wake its own result condvar independently of plain `wait()`
    /// callers (see the design note on two wait channels).
    pub(crate) fn add_finish_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.inner.add_finish_hook(hook);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("status", &self.status()).finish()
    }
}
