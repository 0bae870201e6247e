//! Snapshot writer: one JSON file per symbol in a category directory.
//!
//! Writes are atomic: serialize to `<SYMBOL>.json.tmp`, then rename into
//! place. A reader sees either the previous file or the new one, never a
//! partial write. Existing files are overwritten on every run.

use crate::run_log::RunLog;
use etfpulse_core::domain::file_stem;
use etfpulse_core::OutputRecord;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialize record for {symbol}: {message}")]
    Serialize { symbol: String, message: String },

    #[error("write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Final location of a symbol's record.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(symbol)))
    }

    /// Write a record atomically, returning its path.
    pub fn try_persist(&self, record: &OutputRecord) -> Result<PathBuf, PersistError> {
        let bytes = serde_json::to_vec(record).map_err(|e| PersistError::Serialize {
            symbol: record.symbol.clone(),
            message: e.to_string(),
        })?;

        fs::create_dir_all(&self.dir).map_err(|source| PersistError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(&record.symbol);
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).map_err(|source| io_error(&tmp_path, source))?;
        if let Err(source) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(&tmp_path, source));
        }
        drop(file);

        if let Err(source) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(&path, source));
        }

        Ok(path)
    }

    /// Write a record; on failure, log it and carry on.
    pub fn persist(&self, record: &OutputRecord, log: &RunLog) -> Option<PathBuf> {
        match self.try_persist(record) {
            Ok(path) => Some(path),
            Err(e) => {
                log.error(format_args!("could not save {}: {e}", record.symbol));
                None
            }
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistError {
    PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}
