// src/combinators.rs

//! `invoke`/`then`/`whenAll`/`whenFirst`/`whenAllBeforeDeadline`.
//!
//! Every combinator here is built purely from `Task::add_dependency`/
//! `add_trigger`/`set_time_trigger` plus `Future`; none of them introduce
//! new scheduling code of their own.

use std::time::Instant;

use crate::errors::Result;
use crate::executor::Executor;
use crate::future::Future;

/// `invoke(f)`: ready immediately (no dependency, trigger, or time
/// trigger is ever attached).
pub fn invoke<T, F>(executor: &Executor, f: F) -> Result<Future<T>>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let fut = Future::new(f);
    executor.submit(&fut)?;
    Ok(fut)
}

/// `then(p, f)`: ready once `p` finishes; `f` receives `p`'s value (via
/// `p.get()` inside the new task's body) and computes a new result. A
/// failure in `p` propagates naturally because `p.get()` rethrows it from
/// inside this task's body.
pub fn then<T, U, F>(executor: &Executor, p: &Future<T>, f: F) -> Result<Future<U>>
where
    T: Clone + Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
{
    let dep = p.clone();
    let body_dep = p.clone();
    let fut = Future::new(move || {
        let value = body_dep.get()?;
        f(value)
    });
    fut.add_dependency(&dep);
    executor.submit(&fut)?;
    Ok(fut)
}

/// `whenAll(ps)`: ready once *every* `p` has finished (one dependency per
/// source). Produces the vector of their values, in input order.
pub fn when_all<T>(executor: &Executor, ps: &[Future<T>]) -> Result<Future<Vec<T>>>
where
    T: Clone + Send + 'static,
{
    let deps: Vec<Future<T>> = ps.to_vec();
    let body_deps = deps.clone();
    let fut = Future::new(move || {
        let mut values = Vec::with_capacity(body_deps.len());
        for p in &body_deps {
            values.push(p.get()?);
        }
        Ok(values)
    });
    for p in &deps {
        fut.add_dependency(p);
    }
    executor.submit(&fut)?;
    Ok(fut)
}

/// `whenFirst(ps)`: ready as soon as *any* `p` finishes (one trigger per
/// source, not a dependency, so one finish suffices). Produces the value
/// of whichever source is found
/// finished first; unfinished sources are left to complete on their own.
pub fn when_first<T>(executor: &Executor, ps: &[Future<T>]) -> Result<Future<T>>
where
    T: Clone + Send + 'static,
{
    let deps: Vec<Future<T>> = ps.to_vec();
    let body_deps = deps.clone();
    let fut = Future::new(move || {
        for p in &body_deps {
            if p.is_finished() {
                return Ok(p.get()?);
            }
        }
        Err(anyhow::anyhow!(
            "whenFirst task ran with no finished source (trigger fired but state already changed)"
        ))
    });
    for p in &deps {
        fut.add_trigger(p);
    }
    executor.submit(&fut)?;
    Ok(fut)
}

/// `whenAllBeforeDeadline(ps, t)`: ready only when the deadline `t` fires
/// (a bare time trigger, no dependencies or triggers). Samples whichever
/// sources have *completed* by then; sources that are still running,
/// failed, or canceled are silently omitted rather than failing the
/// combined future.
pub fn when_all_before_deadline<T>(
    executor: &Executor,
    ps: &[Future<T>],
    deadline: Instant,
) -> Result<Future<Vec<T>>>
where
    T: Clone + Send + 'static,
{
    let deps: Vec<Future<T>> = ps.to_vec();
    let fut = Future::new(move || {
        Ok(deps
            .iter()
            .filter(|p| p.is_completed())
            .map(|p| p.get().expect("Completed future must yield a value"))
            .collect())
    });
    fut.set_time_trigger(deadline);
    executor.submit(&fut)?;
    Ok(fut)
}
