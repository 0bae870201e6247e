//! Run-level cancellation signal.
//!
//! Raising the token stops the pool from dispatching new items and stops the
//! retry executor from scheduling further attempts. Work already in flight
//! finishes its current attempt and is persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also reports cancelled once `budget` has elapsed from now.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
