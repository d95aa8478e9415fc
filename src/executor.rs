// src/executor.rs

//! Fixed-size worker pool consuming a FIFO ready queue, plus one
//! timer-dispatch thread per worker feeding that same queue when deadlines
//! fire. Owns two-phase shutdown.
//!
//! Lock ordering: the executor's queue lock is never held while calling
//! into a task's public methods (submitting a task re-enters it only after
//! dropping the queue guard), matching the rule in `task.rs` that a task's
//! own lock is released before walking its peers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info};

use crate::errors::{Result, TaskGraphError};
use crate::task::{Task, TaskStatus};
use crate::timer_heap::TimerHeap;

struct QueueState {
    ready: VecDeque<Task>,
    /// Tasks queued or running, keyed by `Task::id()`. Prevents premature
    /// destruction between submission and completion and gives
    /// `waitShutdown` something to cancel in bulk.
    submitted: HashMap<usize, Task>,
}

/// The state an `Executor` shares with every task it is bound to (tasks
/// hold only a `Weak<Shared>`, since the executor binding is non-owning).
pub(crate) struct Shared {
    queue: Mutex<QueueState>,
    queue_cv: Condvar,
    timer_heap: TimerHeap,
    shutdown_mutex: Mutex<bool>,
    shutdown_cv: Condvar,
}

impl Shared {
    fn new() -> Self {
        Shared {
            queue: Mutex::new(QueueState {
                ready: VecDeque::new(),
                submitted: HashMap::new(),
            }),
            queue_cv: Condvar::new(),
            timer_heap: TimerHeap::new(),
            shutdown_mutex: Mutex::new(false),
            shutdown_cv: Condvar::new(),
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_mutex.lock().unwrap()
    }

    /// Submission admission: rejects and cancels the task if
    /// shutdown is already active, otherwise enqueues it and wakes one
    /// waiter. Called only for tasks whose status was just flipped to
    /// `Pending` by `task::Inner::try_submit_locked`/`fire_timer`.
    pub(crate) fn add_to_do(&self, task: Task) {
        if self.is_shutdown() {
            task.cancel_pending();
            return;
        }
        let mut queue = self.queue.lock().unwrap();
        // Re-check under the queue lock: `startShutdown` flips the flag
        // and wakes queue waiters, but a submission racing just before
        // that must still be resolved consistently with `waitShutdown`'s
        // final sweep over `submitted`.
        if self.is_shutdown() {
            drop(queue);
            task.cancel_pending();
            return;
        }
        queue.submitted.insert(task.id(), task.clone());
        queue.ready.push_back(task);
        self.queue_cv.notify_one();
    }

    pub(crate) fn push_timer(&self, deadline: std::time::Instant, task: Task) {
        self.timer_heap.push(deadline, task);
    }
}

/// A fixed-size thread-pool executor. Construct with
/// [`MakeThreadPoolExecutor`].
pub struct Executor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer_dispatchers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    /// `MakeThreadPoolExecutor(n)`: `n` workers, each paired with a
    /// timer-dispatch thread feeding the same ready queue (one dispatcher
    /// per worker is an equally valid arrangement to a shared pool of
    /// dispatchers). `n == 0` is a construction misuse, reported as a typed
    /// error rather than a bare assertion since it's cheap to check and
    /// worth surfacing to the caller.
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(TaskGraphError::ZeroWorkers(n));
        }

        let shared = Arc::new(Shared::new());
        let mut workers = Vec::with_capacity(n);
        let mut timer_dispatchers = Vec::with_capacity(n);

        for i in 0..n {
            let worker_shared = shared.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("taskgraph-worker-{i}"))
                    .spawn(move || worker_loop(worker_shared))
                    .expect("failed to spawn worker thread"),
            );

            let timer_shared = shared.clone();
            timer_dispatchers.push(
                std::thread::Builder::new()
                    .name(format!("taskgraph-timer-{i}"))
                    .spawn(move || timer_dispatch_loop(timer_shared))
                    .expect("failed to spawn timer-dispatch thread"),
            );
        }

        info!(workers = n, "thread pool executor started");
        Ok(Executor {
            shared,
            workers: Mutex::new(workers),
            timer_dispatchers: Mutex::new(timer_dispatchers),
        })
    }

    /// Binds `task` to this executor and, if its gates are already open,
    /// submits it. Exactly-once binding is enforced by
    /// `task::Inner::set_executor`; calling `submit` twice on the same
    /// task is a misuse surfaced here as `AlreadyBound`.
    pub fn submit(&self, task: &Task) -> Result<()> {
        if !task.bind_executor(Arc::downgrade(&self.shared)) {
            return Err(TaskGraphError::AlreadyBound);
        }
        Ok(())
    }

    /// Phase 1 of shutdown: stops accepting new readiness
    /// transitions into the queue, stops the timer heap, and wakes every
    /// worker blocked on the queue condvar. Idempotent.
    pub fn start_shutdown(&self) {
        let mut flag = self.shared.shutdown_mutex.lock().unwrap();
        if *flag {
            return;
        }
        *flag = true;
        drop(flag);
        self.shared.timer_heap.stop();
        self.shared.queue_cv.notify_all();
        self.shared.shutdown_cv.notify_all();
        debug!("executor shutdown started");
    }

    /// Phase 2 of shutdown: implicitly starts shutdown if not already
    /// started, joins every worker/dispatch thread, then cancels whatever
    /// is left in the ready queue and the submitted-task set (after this
    /// returns, every task ever submitted is terminal).
    /// Idempotent — a second call finds empty thread/task lists and
    /// returns immediately.
    pub fn wait_shutdown(&self) {
        self.start_shutdown();

        for handle in self.workers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        for handle in self.timer_dispatchers.lock().unwrap().drain(..) {
            let _ = handle.join();
        }

        let mut queue = self.shared.queue.lock().unwrap();
        let leftover: Vec<Task> = queue.ready.drain(..).collect();
        queue.submitted.clear();
        drop(queue);

        for task in leftover {
            task.cancel_pending();
        }
        info!("executor shutdown complete");
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.wait_shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = match next_ready_task(&shared) {
            Some(task) => task,
            None => return,
        };

        if !task.set_in_progress() {
            // Cancelled between being dequeued and flipped to InProgress
            // cannot happen under the single-consumer-per-task model, but
            // a task pulled from the head that was already non-Pending is
            // skipped by `next_ready_task`'s FIFO-skipping loop; this is
            // just defense against that invariant ever drifting.
            shared.queue.lock().unwrap().submitted.remove(&task.id());
            continue;
        }

        let result = task.run_body();
        match result {
            Ok(()) => task.set_completed(),
            Err(err) => task.set_failed(err),
        }

        shared.queue.lock().unwrap().submitted.remove(&task.id());
    }
}

/// Waits for (queue non-empty) or shutdown, discarding queue-head entries
/// that were cancelled while queued, and returns the
/// next truly-`Pending` task. Returns `None` once shutdown is observed.
fn next_ready_task(shared: &Arc<Shared>) -> Option<Task> {
    let mut queue = shared.queue.lock().unwrap();
    loop {
        if shared.is_shutdown() {
            return None;
        }
        while let Some(front) = queue.ready.front() {
            if front.status() != TaskStatus::Pending {
                queue.ready.pop_front();
            } else {
                break;
            }
        }
        if let Some(task) = queue.ready.pop_front() {
            return Some(task);
        }
        queue = shared.queue_cv.wait(queue).unwrap();
    }
}

fn timer_dispatch_loop(shared: Arc<Shared>) {
    loop {
        match shared.timer_heap.pop() {
            Some(task) => task.fire_timer(),
            None => return,
        }
    }
}

/// The crate's executor constructor.
pub fn make_thread_pool_executor(n: usize) -> Result<Executor> {
    Executor::new(n)
}
