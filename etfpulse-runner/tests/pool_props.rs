//! Property tests for the worker pool and retry executor.
//!
//! 1. Exactly-once dispatch for any item count and pool size
//! 2. k failures below the budget cost k+1 calls and end in success
//! 3. A budget-exhausting fetch is called exactly max_attempts times

use etfpulse_core::FetchError;
use etfpulse_runner::{CancelToken, PoolSize, RetryExecutor, RetryPolicy, RunLog, WorkerPool};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_pool_size() -> impl Strategy<Value = PoolSize> {
    prop_oneof![
        (1usize..16).prop_map(PoolSize::Bounded),
        Just(PoolSize::PerItem),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_item_dispatched_once(n in 0usize..64, size in arb_pool_size()) {
        let items: Vec<usize> = (0..n).collect();
        let hits: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();

        let report = WorkerPool::new(size, "prop").run(&items, &CancelToken::new(), |_, i| {
            hits[*i].fetch_add(1, Ordering::SeqCst);
        });

        prop_assert_eq!(report.dispatched, n);
        prop_assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn retry_calls_match_failures(max in 1u32..6, failures in 0u32..8) {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(RetryPolicy::new(max, Duration::ZERO), &log, &cancel);

        let mut calls = 0u32;
        let outcome = exec.execute("SPY", || {
            calls += 1;
            if calls <= failures {
                Err(FetchError::Other("transient".into()))
            } else {
                Ok(())
            }
        });

        if failures < max {
            prop_assert!(outcome.is_success());
            prop_assert_eq!(calls, failures + 1);
        } else {
            prop_assert!(!outcome.is_success());
            prop_assert_eq!(calls, max);
            prop_assert_eq!(outcome.attempts(), max);
        }
    }
}
