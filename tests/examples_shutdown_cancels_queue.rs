//! Submit 100 tasks to a 1-worker executor; call startShutdown after the
//! worker begins task #1; waitShutdown returns with tasks #2..#100
//! Canceled and task #1 Completed or Failed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskgraph::{Executor, Future};

#[test]
fn shutdown_drains_the_running_task_and_cancels_the_rest() {
    let executor = Executor::new(1).unwrap();
    let started = Arc::new(AtomicUsize::new(0));

    let first_started = started.clone();
    let first = Future::new(move || {
        first_started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    });
    executor.submit(&first).unwrap();

    while started.load(Ordering::SeqCst) == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }

    let mut rest = Vec::new();
    for _ in 0..99 {
        let t: Future<()> = Future::new(|| Ok(()));
        executor.submit(&t).unwrap();
        rest.push(t);
    }

    executor.start_shutdown();
    executor.wait_shutdown();

    assert!(first.is_completed() || first.is_failed());
    for t in &rest {
        assert!(t.is_canceled(), "queued task should have been canceled by shutdown");
        t.wait();
    }
}

#[test]
fn waiting_for_shutdown_twice_is_idempotent_and_returns_promptly() {
    let executor = Executor::new(2).unwrap();
    executor.wait_shutdown();
    executor.wait_shutdown();
}

#[test]
fn submitting_after_shutdown_cancels_the_task_without_panicking() {
    let executor = Executor::new(1).unwrap();
    executor.start_shutdown();
    executor.wait_shutdown();

    let t: Future<()> = Future::new(|| Ok(()));
    // Binding to a shut-down executor still succeeds (exactly-once bind),
    // but the task is immediately rejected into `Canceled`.
    executor.submit(&t).unwrap();
    t.wait();
    assert!(t.is_canceled());
}
