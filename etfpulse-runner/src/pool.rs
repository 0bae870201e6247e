//! Worker pool scheduler.
//!
//! All items are known up front. `workers` threads pull indices from a
//! shared atomic cursor, so each item is claimed by exactly one worker.
//! `run` returns once every item has been claimed and every in-flight call
//! has returned. A panic in the per-item function is caught, logged and
//! counted; the worker moves on to the next item.

use crate::cancel::CancelToken;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How many workers a category run gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PoolSizeRepr", into = "PoolSizeRepr")]
pub enum PoolSize {
    /// At most this many concurrent workers.
    Bounded(usize),
    /// One worker per item, no bound.
    PerItem,
}

impl PoolSize {
    /// Worker count for a batch of `items`; never more workers than items.
    pub fn workers_for(self, items: usize) -> usize {
        match self {
            PoolSize::Bounded(n) => n.max(1).min(items),
            PoolSize::PerItem => items,
        }
    }
}

impl Default for PoolSize {
    fn default() -> Self {
        PoolSize::Bounded(5)
    }
}

impl fmt::Display for PoolSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolSize::Bounded(n) => write!(f, "{n}"),
            PoolSize::PerItem => f.write_str("per_item"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PoolSizeRepr {
    Count(usize),
    Name(String),
}

impl TryFrom<PoolSizeRepr> for PoolSize {
    type Error = String;

    fn try_from(repr: PoolSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            PoolSizeRepr::Count(0) => Err("worker count must be at least 1".into()),
            PoolSizeRepr::Count(n) => Ok(PoolSize::Bounded(n)),
            PoolSizeRepr::Name(s) if s == "per_item" => Ok(PoolSize::PerItem),
            PoolSizeRepr::Name(s) => Err(format!(
                "invalid worker setting '{s}' (expected an integer or \"per_item\")"
            )),
        }
    }
}

impl From<PoolSize> for PoolSizeRepr {
    fn from(size: PoolSize) -> Self {
        match size {
            PoolSize::Bounded(n) => PoolSizeRepr::Count(n),
            PoolSize::PerItem => PoolSizeRepr::Name("per_item".into()),
        }
    }
}

/// What happened during one `WorkerPool::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub workers: usize,
    /// Items handed to the per-item function.
    pub dispatched: usize,
    /// Dispatched items whose per-item function panicked.
    pub panicked: usize,
    /// Items never dispatched because the run was cancelled.
    pub skipped: usize,
}

pub struct WorkerPool {
    size: PoolSize,
    name: String,
}

impl WorkerPool {
    pub fn new(size: PoolSize, name: impl Into<String>) -> Self {
        Self {
            size,
            name: name.into(),
        }
    }

    pub fn size(&self) -> PoolSize {
        self.size
    }

    /// Run `f(worker_index, item)` once per item and block until done.
    pub fn run<T, F>(&self, items: &[T], cancel: &CancelToken, f: F) -> PoolReport
    where
        T: Sync,
        F: Fn(usize, &T) + Sync,
    {
        let workers = self.size.workers_for(items.len());
        if workers == 0 {
            return PoolReport::default();
        }

        let cursor = AtomicUsize::new(0);
        let dispatched = AtomicUsize::new(0);
        let panicked = AtomicUsize::new(0);
        let state = Shared {
            items,
            cursor: &cursor,
            dispatched: &dispatched,
            panicked: &panicked,
            cancel,
            f: &f,
            pool: &self.name,
        };

        let name = self.name.clone();
        match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{name}-worker-{i}"))
            .build()
        {
            Ok(pool) => pool.scope(|s| {
                for worker in 0..workers {
                    let state = &state;
                    s.spawn(move |_| state.work(worker));
                }
            }),
            Err(e) => {
                log::warn!(
                    "could not start {workers} worker threads for {}: {e}; running on the calling thread",
                    self.name
                );
                state.work(0);
            }
        }

        let dispatched = dispatched.into_inner();
        PoolReport {
            workers,
            dispatched,
            panicked: panicked.into_inner(),
            skipped: items.len() - dispatched,
        }
    }
}

struct Shared<'a, T, F> {
    items: &'a [T],
    cursor: &'a AtomicUsize,
    dispatched: &'a AtomicUsize,
    panicked: &'a AtomicUsize,
    cancel: &'a CancelToken,
    f: &'a F,
    pool: &'a str,
}

impl<T, F> Shared<'_, T, F>
where
    T: Sync,
    F: Fn(usize, &T) + Sync,
{
    fn work(&self, worker: usize) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            let Some(item) = self.items.get(index) else {
                return;
            };
            self.dispatched.fetch_add(1, Ordering::SeqCst);

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (self.f)(worker, item))) {
                self.panicked.fetch_add(1, Ordering::SeqCst);
                log::error!(
                    "{} worker {worker} panicked on item {index}: {}",
                    self.pool,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
