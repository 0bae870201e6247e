//! Output-directory scan: what state is each catalog symbol in?

use crate::writer::SnapshotWriter;
use etfpulse_core::{InstrumentDescriptor, RecordState};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub symbol: String,
    pub state: RecordState,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub dir: PathBuf,
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub fn count(&self, state: RecordState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn symbols_in(&self, state: RecordState) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.state == state)
            .map(|e| e.symbol.as_str())
            .collect()
    }
}

/// Classify every instrument's record file in `dir`, in catalog order.
pub fn scan(dir: &Path, instruments: &[InstrumentDescriptor]) -> StatusReport {
    let writer = SnapshotWriter::new(dir);
    let entries = instruments
        .iter()
        .map(|inst| {
            let state = match std::fs::read_to_string(writer.path_for(&inst.symbol)) {
                Ok(contents) => RecordState::classify(&contents),
                Err(e) if e.kind() == ErrorKind::NotFound => RecordState::Missing,
                Err(_) => RecordState::Unreadable,
            };
            StatusEntry {
                symbol: inst.symbol.clone(),
                state,
            }
        })
        .collect();

    StatusReport {
        dir: dir.to_path_buf(),
        entries,
    }
}
