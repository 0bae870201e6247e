//! Bounded retry around a single fetch.
//!
//! Every failure is treated the same way regardless of its error variant:
//! log it, sleep, try again, up to `max_attempts`. The last error becomes
//! the terminal `Failure` for that item. Nothing here escalates to the run.

use crate::cancel::CancelToken;
use crate::run_log::RunLog;
use etfpulse_core::domain::FetchOutcome;
use etfpulse_core::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Runs fetch closures under a retry policy, reporting failures to a run log.
pub struct RetryExecutor<'a> {
    policy: RetryPolicy,
    log: &'a RunLog,
    cancel: &'a CancelToken,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: RetryPolicy, log: &'a RunLog, cancel: &'a CancelToken) -> Self {
        Self {
            policy,
            log,
            cancel,
        }
    }

    /// Call `fetch` until it succeeds or the attempt budget is spent.
    ///
    /// If the cancel token is raised, no further attempt is scheduled after
    /// the one in flight; the item fails with the attempts actually made.
    pub fn execute<T, F>(&self, symbol: &str, mut fetch: F) -> FetchOutcome<T>
    where
        F: FnMut() -> Result<T, FetchError>,
    {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match fetch() {
                Ok(payload) => {
                    return FetchOutcome::Success {
                        payload,
                        attempts: attempt,
                    }
                }
                Err(err) => err,
            };

            self.log.error(format_args!(
                "fetch failed for {symbol} (attempt {attempt}/{max}): {err}"
            ));

            if attempt >= max {
                self.log.error(format_args!(
                    "giving up on {symbol} after {attempt} attempts: {err}"
                ));
                return FetchOutcome::Failure {
                    message: err.to_string(),
                    attempts: attempt,
                };
            }

            if self.cancel.is_cancelled() {
                return self.abandon(symbol, attempt, &err);
            }

            if !self.policy.delay.is_zero() {
                std::thread::sleep(self.policy.delay);
                if self.cancel.is_cancelled() {
                    return self.abandon(symbol, attempt, &err);
                }
            }
        }
    }

    fn abandon<T>(&self, symbol: &str, attempt: u32, err: &FetchError) -> FetchOutcome<T> {
        self.log.error(format_args!(
            "run cancelled, abandoning {symbol} after {attempt} attempts: {err}"
        ));
        FetchOutcome::Failure {
            message: format!("cancelled after {attempt} attempts: {err}"),
            attempts: attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::ZERO)
    }

    fn flaky(failures: u32) -> impl FnMut() -> Result<u32, FetchError> {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls <= failures {
                Err(FetchError::NetworkUnreachable("connection reset".into()))
            } else {
                Ok(calls)
            }
        }
    }

    #[test]
    fn success_first_try_makes_one_call() {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(policy(3), &log, &cancel);

        let outcome = exec.execute("SPY", flaky(0));
        assert_eq!(
            outcome,
            FetchOutcome::Success {
                payload: 1,
                attempts: 1
            }
        );
    }

    #[test]
    fn k_failures_then_success_takes_k_plus_one_calls() {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(policy(5), &log, &cancel);

        for k in 0..5 {
            let outcome = exec.execute("SPY", flaky(k));
            assert!(outcome.is_success());
            assert_eq!(outcome.attempts(), k + 1);
        }
    }

    #[test]
    fn always_failing_exhausts_budget() {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(policy(3), &log, &cancel);

        let mut calls = 0;
        let outcome: FetchOutcome<()> = exec.execute("ZZZ", || {
            calls += 1;
            Err(FetchError::NoData {
                symbol: "ZZZ".into(),
            })
        });
        assert_eq!(calls, 3);
        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                message: "no data returned for ZZZ".into(),
                attempts: 3
            }
        );
    }

    #[test]
    fn zero_max_attempts_still_tries_once() {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(
            RetryPolicy {
                max_attempts: 0,
                delay: Duration::ZERO,
            },
            &log,
            &cancel,
        );
        let outcome = exec.execute("SPY", flaky(10));
        assert_eq!(outcome.attempts(), 1);
        assert!(!outcome.is_success());
    }

    #[test]
    fn cancellation_stops_after_in_flight_attempt() {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(policy(5), &log, &cancel);

        let mut calls = 0;
        let outcome: FetchOutcome<()> = exec.execute("SPY", || {
            calls += 1;
            cancel.cancel();
            Err(FetchError::Other("boom".into()))
        });
        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts(), 1);
        assert!(!outcome.is_success());
    }

    #[test]
    fn cancel_during_delay_prevents_next_attempt() {
        let log = RunLog::discard();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(
            RetryPolicy::new(5, Duration::from_millis(300)),
            &log,
            &cancel,
        );

        let canceller = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };

        let mut calls = 0;
        let outcome: FetchOutcome<()> = exec.execute("SPY", || {
            calls += 1;
            Err(FetchError::Other("timeout".into()))
        });
        canceller.join().unwrap();

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts(), 1);
        assert!(matches!(
            outcome,
            FetchOutcome::Failure { ref message, .. } if message.starts_with("cancelled after 1 attempts")
        ));
    }

    #[test]
    fn each_failure_is_logged_with_attempt_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_quote.log");
        let log = RunLog::create(&path).unwrap();
        let cancel = CancelToken::new();
        let exec = RetryExecutor::new(policy(2), &log, &cancel);

        let _: FetchOutcome<()> =
            exec.execute("QQQ", || Err(FetchError::Other("timeout".into())));
        log.flush();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("fetch failed for QQQ (attempt 1/2)"));
        assert!(content.contains("fetch failed for QQQ (attempt 2/2)"));
        assert!(content.contains("giving up on QQQ after 2 attempts"));
        assert_eq!(content.lines().count(), 3);
    }
}
