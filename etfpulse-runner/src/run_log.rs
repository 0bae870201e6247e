//! Per-run error log.
//!
//! One append-only file per category run, truncated when the run log is
//! created. The log is an injected `fern` logger built with `into_log()`,
//! not the process-global logger, so concurrent category runs each get
//! their own file. Concurrent workers are serialized inside the logger.
//!
//! Line format: `2024-05-01T14:03:22.123456 - ERROR - <message>`

use log::{Level, LevelFilter, Log, Record};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

const TARGET: &str = "etfpulse::run_log";

#[derive(Debug, Error)]
#[error("open run log {path}: {source}")]
pub struct RunLogError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

pub struct RunLog {
    path: Option<PathBuf>,
    logger: Box<dyn Log>,
}

impl RunLog {
    /// Create (or truncate) the log file, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RunLogError> {
        let path = path.as_ref().to_path_buf();
        let err = |source| RunLogError {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(err)?;

        let (_, logger) = base_dispatch().chain(file).into_log();
        Ok(Self {
            path: Some(path),
            logger,
        })
    }

    /// A run log that drops every line.
    pub fn discard() -> Self {
        let (_, logger) = base_dispatch().into_log();
        Self { path: None, logger }
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.write(Level::Error, &message);
    }

    fn write(&self, level: Level, message: &dyn fmt::Display) {
        self.logger.log(
            &Record::builder()
                .level(level)
                .target(TARGET)
                .args(format_args!("{message}"))
                .build(),
        );
        log::debug!(target: TARGET, "{message}");
    }

    pub fn flush(&self) {
        self.logger.flush();
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.logger.flush();
    }
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog").field("path", &self.path).finish()
    }
}

fn base_dispatch() -> fern::Dispatch {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
                record.level(),
                message
            ))
        })
        .level(LevelFilter::Trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/data_quote.log");
        let log = RunLog::create(&path).unwrap();
        log.error("fetch failed for SPY (attempt 1/3): timeout");
        log.error("giving up on SPY after 3 attempts: timeout");
        log.flush();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - ERROR - fetch failed for SPY (attempt 1/3): timeout"));
        assert!(lines[1].contains(" - ERROR - giving up on SPY"));
        // Timestamp prefix: YYYY-MM-DDTHH:MM:SS
        assert_eq!(&lines[0][4..5], "-");
        assert_eq!(&lines[0][10..11], "T");
    }

    #[test]
    fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "old line\n").unwrap();

        let log = RunLog::create(&path).unwrap();
        log.flush();
        drop(log);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn discard_accepts_lines() {
        let log = RunLog::discard();
        log.error("ignored");
        log.flush();
        assert!(format!("{log:?}").contains("None"));
    }
}
