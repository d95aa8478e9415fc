// src/errors.rs

//! Crate-wide error type.
//!
//! Per-task failures are deliberately *not* modeled here: a task's failure
//! payload is whatever the user's closure returned as `Err` with, boxed
//! opaquely (see [`crate::task::Failure`]) and replayed to the first
//! `Future::get()` caller. `TaskGraphError` only covers misuse of the
//! executor/task construction API that a caller can reasonably report.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskGraphError {
    #[error("thread pool executor needs at least one worker, got {0}")]
    ZeroWorkers(usize),

    #[error("task already bound to an executor")]
    AlreadyBound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TaskGraphError>;
