//! One generic category pipeline.
//!
//! A category run is: worker pool over the catalog, each item going through
//! the retry executor (fetch, then the optional post-process step), then
//! the snapshot writer. The four categories differ only in the capability
//! and whether a post-process step is attached.

use crate::cancel::CancelToken;
use crate::config::CategorySettings;
use crate::pool::{panic_message, WorkerPool};
use crate::retry::RetryExecutor;
use crate::run_log::RunLog;
use crate::writer::SnapshotWriter;
use chrono::Utc;
use etfpulse_core::domain::FetchOutcome;
use etfpulse_core::{
    Category, FetchCapability, FetchError, InstrumentDescriptor, OutputRecord, Payload,
    PostProcess,
};
use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counts for one finished category run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub category: Category,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items whose record could not be written.
    pub write_failures: usize,
    /// Items never dispatched because the run was cancelled.
    pub skipped: usize,
    /// Panics caught inside workers.
    pub panics: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when every item was dispatched.
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} instruments, {} ok, {} failed, {} write errors",
            self.category, self.total, self.succeeded, self.failed, self.write_failures
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped (cancelled)", self.skipped)?;
        }
        if self.panics > 0 {
            write!(f, ", {} worker panics", self.panics)?;
        }
        write!(f, " in {:.1}s", self.elapsed.as_secs_f64())
    }
}

pub struct Pipeline<'a> {
    capability: &'a dyn FetchCapability,
    post_process: Option<&'a dyn PostProcess>,
    settings: CategorySettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(capability: &'a dyn FetchCapability, settings: CategorySettings) -> Self {
        Self {
            capability,
            post_process: None,
            settings,
        }
    }

    /// Attach a step that reshapes each fetched payload before it is saved.
    pub fn with_post_process(mut self, step: &'a dyn PostProcess) -> Self {
        self.post_process = Some(step);
        self
    }

    pub fn category(&self) -> Category {
        self.capability.category()
    }

    /// Fetch and persist every instrument; blocks until the run is over.
    pub fn run(
        &self,
        instruments: &[InstrumentDescriptor],
        log: &RunLog,
        cancel: &CancelToken,
    ) -> RunSummary {
        let started = Instant::now();
        let category = self.category();
        let pool = WorkerPool::new(self.settings.pool, format!("etfpulse-{category}"));
        log::info!(
            "{category}: fetching {} instruments (workers: {}, max attempts: {}) into {}",
            instruments.len(),
            pool.size(),
            self.settings.retry.max_attempts,
            self.settings.output_dir.display()
        );

        let writer = SnapshotWriter::new(&self.settings.output_dir);
        let executor = RetryExecutor::new(self.settings.retry, log, cancel);
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let write_failures = AtomicUsize::new(0);
        let panics = AtomicUsize::new(0);

        let report = pool.run(instruments, cancel, |_, instrument| {
            let outcome = self.process(instrument, &executor, log, &panics);
            if outcome.is_success() {
                succeeded.fetch_add(1, Ordering::Relaxed);
            } else {
                failed.fetch_add(1, Ordering::Relaxed);
            }

            let record =
                OutputRecord::from_outcome(instrument, category, outcome, Utc::now().timestamp());
            if writer.persist(&record, log).is_none() {
                write_failures.fetch_add(1, Ordering::Relaxed);
            }
        });
        log.flush();

        let summary = RunSummary {
            category,
            total: instruments.len(),
            succeeded: succeeded.into_inner(),
            failed: failed.into_inner(),
            write_failures: write_failures.into_inner(),
            skipped: report.skipped,
            panics: panics.into_inner() + report.panicked,
            elapsed: started.elapsed(),
        };
        log::info!("{summary}");
        summary
    }

    /// Retry-wrapped fetch for one instrument. A panic anywhere in the
    /// fetch path becomes a failure for this item only.
    fn process(
        &self,
        instrument: &InstrumentDescriptor,
        executor: &RetryExecutor<'_>,
        log: &RunLog,
        panics: &AtomicUsize,
    ) -> FetchOutcome<Payload> {
        let symbol = instrument.symbol.as_str();
        let attempts = Cell::new(0_u32);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.execute(symbol, || {
                attempts.set(attempts.get() + 1);
                self.fetch_once(symbol)
            })
        }));

        result.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            panics.fetch_add(1, Ordering::Relaxed);
            log.error(format_args!("unexpected error while fetching {symbol}: {message}"));
            log::error!("{}: worker panicked on {symbol}: {message}", self.category());
            FetchOutcome::Failure {
                message: format!("unexpected error: {message}"),
                attempts: attempts.get().max(1),
            }
        })
    }

    fn fetch_once(&self, symbol: &str) -> Result<Payload, FetchError> {
        let payload = self.capability.fetch(symbol)?;
        match self.post_process {
            Some(step) => step.apply(symbol, payload),
            None => Ok(payload),
        }
    }
}

/// A pipeline paired with the run log it writes to.
pub struct CategoryJob<'a> {
    pub pipeline: Pipeline<'a>,
    pub log: RunLog,
}

/// Run several category pipelines side by side, one thread each.
///
/// Summaries come back in job order. A job whose thread cannot be started
/// runs on the calling thread after the others are launched.
pub fn run_concurrently(
    jobs: &[CategoryJob<'_>],
    instruments: &[InstrumentDescriptor],
    cancel: &CancelToken,
) -> Vec<RunSummary> {
    std::thread::scope(|s| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|job| {
                let spawned = std::thread::Builder::new()
                    .name(format!("etfpulse-{}", job.pipeline.category()))
                    .spawn_scoped(s, move || job.pipeline.run(instruments, &job.log, cancel));
                (job, spawned)
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|(job, spawned)| match spawned {
                Ok(handle) => match handle.join() {
                    Ok(summary) => Some(summary),
                    Err(payload) => {
                        log::error!(
                            "{} run aborted: {}",
                            job.pipeline.category(),
                            panic_message(payload.as_ref())
                        );
                        None
                    }
                },
                Err(e) => {
                    log::warn!(
                        "could not start thread for {}: {e}; running inline",
                        job.pipeline.category()
                    );
                    Some(job.pipeline.run(instruments, &job.log, cancel))
                }
            })
            .collect()
    })
}
