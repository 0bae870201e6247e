//! ETFPulse Runner: the fetch-and-persist engine.
//!
//! - `config`: TOML pipeline configuration and per-category resolution
//! - `retry`: bounded, uniform retry around one fetch
//! - `pool`: worker pool scheduler (bounded or one worker per item)
//! - `pipeline`: generic category run (pool + retry + writer) and summaries
//! - `writer`: atomic per-symbol JSON snapshots
//! - `run_log`: injected per-run error log
//! - `cancel`: run-level cancellation token
//! - `status`: classify the output directory per symbol

pub mod cancel;
pub mod config;
pub mod pipeline;
pub mod pool;
pub mod retry;
pub mod run_log;
pub mod status;
pub mod writer;

pub use cancel::CancelToken;
pub use config::{CategorySettings, ConfigError, PipelineConfig};
pub use pipeline::{run_concurrently, CategoryJob, Pipeline, RunSummary};
pub use pool::{PoolReport, PoolSize, WorkerPool};
pub use retry::{RetryExecutor, RetryPolicy};
pub use run_log::{RunLog, RunLogError};
pub use status::{scan, StatusReport};
pub use writer::{PersistError, SnapshotWriter};
