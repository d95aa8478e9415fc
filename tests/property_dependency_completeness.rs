//! Property-based check of dependency completeness: whenAll never yields
//! before every source has reached a terminal state, regardless of how the
//! sources are interleaved in time.

use std::time::Duration;

use proptest::prelude::*;
use taskgraph::{invoke, when_all, Executor};

proptest! {
    #[test]
    fn when_all_always_collects_every_source(delays_ms in proptest::collection::vec(0u64..15, 1..8)) {
        let executor = Executor::new(4).unwrap();

        let sources: Vec<_> = delays_ms
            .iter()
            .map(|&delay| {
                invoke(&executor, move || {
                    if delay > 0 {
                        std::thread::sleep(Duration::from_millis(delay));
                    }
                    Ok(delay)
                })
                .unwrap()
            })
            .collect();

        let expected_count = sources.len();
        let combined = when_all(&executor, &sources).unwrap();
        let results = combined.get().unwrap();

        prop_assert_eq!(results.len(), expected_count);
        for (source, delay) in sources.iter().zip(delays_ms.iter()) {
            prop_assert!(source.is_completed());
            prop_assert_eq!(source.get().unwrap(), *delay);
        }

        executor.wait_shutdown();
    }
}
