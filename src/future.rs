// src/future.rs

//! `Future<T>`: a [`Task`] that additionally computes and stores a typed
//! value. Rather than modeling this as a subtype of `Task` (a deep
//! inheritance relationship the original design avoided), a `Future` wraps
//! a `Task`, and the extra value-producing behaviour is bolted on through
//! `Task`'s existing finish-hook mechanism rather than new scheduling code.

use std::sync::{Arc, Condvar, Mutex};

use crate::task::{Failure, GetError, Task, TaskStatus};

struct ResultSlot<T> {
    value: Mutex<Option<T>>,
    cv: Condvar,
}

/// A typed task. Cloning a `Future` clones the handle, not the
/// computation — all clones observe the same underlying task and result.
pub struct Future<T> {
    task: Task,
    slot: Arc<ResultSlot<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            task: self.task.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Wraps a producer `f`. Neither attached nor submitted yet — callers
    /// attach dependencies/triggers/time-triggers and then hand this to an
    /// `Executor::submit` (or build it through one of `combinators`),
    /// exactly as for a plain `Task`.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let slot = Arc::new(ResultSlot {
            value: Mutex::new(None),
            cv: Condvar::new(),
        });

        let body_slot = slot.clone();
        let task = Task::new_with_body(Box::new(move || match f() {
            Ok(value) => {
                *body_slot.value.lock().unwrap() = Some(value);
                Ok(())
            }
            Err(err) => Err(Arc::new(err) as Failure),
        }));

        let hook_slot = slot.clone();
        task.add_finish_hook(Box::new(move || {
            hook_slot.cv.notify_all();
        }));

        Future { task, slot }
    }

    /// The underlying `Task` handle, for attaching dependencies/triggers
    /// or for `Executor::submit`. `Future` also derefs to `Task` directly.
    pub fn as_task(&self) -> &Task {
        &self.task
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Blocks until this task is terminal, then:
    /// - `Completed` -> the stored value, cloned so repeat calls agree,
    /// - `Failed` -> the stored failure,
    /// - `Canceled` -> [`GetError::Canceled`].
    pub fn get(&self) -> Result<T, GetError> {
        let mut guard = self.slot.value.lock().unwrap();
        loop {
            if let Some(value) = guard.as_ref() {
                return Ok(value.clone());
            }
            match self.task.status() {
                TaskStatus::Failed => {
                    return Err(GetError::Failed(
                        self.task
                            .get_error()
                            .expect("Failed task must carry an error"),
                    ));
                }
                TaskStatus::Canceled => return Err(GetError::Canceled),
                _ => {}
            }
            guard = self.slot.cv.wait(guard).unwrap();
        }
    }
}

impl<T> std::ops::Deref for Future<T> {
    type Target = Task;

    fn deref(&self) -> &Task {
        &self.task
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").field("status", &self.task.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;

    #[test]
    fn get_returns_the_same_value_on_every_call() {
        let executor = Executor::new(1).unwrap();
        let fut = Future::new(|| Ok(7));
        executor.submit(&fut).unwrap();
        assert_eq!(fut.get().unwrap(), 7);
        assert_eq!(fut.get().unwrap(), 7);
        executor.wait_shutdown();
    }

    #[test]
    fn canceled_future_reports_canceled_not_failed() {
        let fut: Future<i32> = Future::new(|| Ok(1));
        fut.cancel();
        assert!(matches!(fut.get(), Err(GetError::Canceled)));
    }

    #[test]
    fn deref_exposes_task_api() {
        let fut: Future<i32> = Future::new(|| Ok(1));
        assert!(!fut.is_finished());
        fut.cancel();
        assert!(fut.is_canceled());
    }
}
