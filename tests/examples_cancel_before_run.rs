//! Construct T with dependency D (pending); cancel T; complete D. T must be
//! Canceled, and T's dependants notified (T.wait() returns promptly).

use std::time::Duration;

use taskgraph::{Executor, Future, TaskStatus};

#[test]
fn canceling_an_unstarted_task_sticks_even_after_its_dependency_finishes() {
    let executor = Executor::new(1).unwrap();

    let d = Future::new(|| {
        std::thread::sleep(Duration::from_millis(30));
        Ok(())
    });
    let t: Future<()> = Future::new(|| Ok(()));
    t.add_dependency(&d);

    t.cancel();
    assert_eq!(t.status(), TaskStatus::Canceled);

    executor.submit(&d).unwrap();
    d.wait();
    assert!(d.is_completed());

    // T must not have been resurrected by D's completion.
    assert_eq!(t.status(), TaskStatus::Canceled);
    t.wait();

    executor.wait_shutdown();
}

#[test]
fn a_dependant_of_a_canceled_task_is_notified() {
    let d: Future<()> = Future::new(|| Ok(()));
    let dependant = Future::new(|| Ok(42));
    dependant.add_dependency(&d);

    d.cancel();
    assert!(d.is_canceled());

    let executor = Executor::new(1).unwrap();
    executor.submit(&dependant).unwrap();

    // A canceled dependency still counts as "finished": the dependant
    // runs and completes normally (cancellation propagates to waiters the
    // same way a failure does).
    assert_eq!(dependant.get().unwrap(), 42);

    executor.wait_shutdown();
}
