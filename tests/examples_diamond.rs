//! A = invoke(1); B, C each then(A, ...); D = whenAll([B, C]) — a diamond
//! shape, both branches deriving from the same source.

use taskgraph::{invoke, then, when_all, Executor};

#[test]
fn diamond_joins_both_branches_of_the_same_source() {
    let executor = Executor::new(4).unwrap();

    let a = invoke(&executor, || Ok(1)).unwrap();
    let b = then(&executor, &a, |v| Ok(v * 10)).unwrap();
    let c = then(&executor, &a, |v| Ok(v * 100)).unwrap();
    let d = when_all(&executor, &[b, c]).unwrap();

    let mut results = d.get().unwrap();
    results.sort();
    assert_eq!(results.len(), 2);
    assert_eq!(results, vec![10, 100]);

    executor.wait_shutdown();
}
