//! The on-disk unit: one JSON object per (category, symbol).
//!
//! Every record repeats the instrument's identity and classification so a
//! file can be read without the catalog. A record carries either payload
//! fields or failure fields, never both.

use super::{FetchOutcome, InstrumentDescriptor};
use crate::data::provider::{Category, Payload};
use serde::{Deserialize, Serialize};

/// Error code written into every failure record.
pub const FETCH_FAILED: u8 = 1;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutputRecord {
    #[serde(rename = "Ticker")]
    pub symbol: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Category")]
    pub category: Category,
    /// Acquisition instant, unix seconds.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(flatten)]
    pub body: RecordBody,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RecordBody {
    Success(Payload),
    Failure(FailureDetail),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FailureDetail {
    pub error_code: u8,
    pub error_message: String,
    pub attempts: u32,
}

impl OutputRecord {
    pub fn success(
        instrument: &InstrumentDescriptor,
        category: Category,
        payload: Payload,
        timestamp: i64,
    ) -> Self {
        Self::with_body(instrument, category, timestamp, RecordBody::Success(payload))
    }

    pub fn failure(
        instrument: &InstrumentDescriptor,
        category: Category,
        message: impl Into<String>,
        attempts: u32,
        timestamp: i64,
    ) -> Self {
        Self::with_body(
            instrument,
            category,
            timestamp,
            RecordBody::Failure(FailureDetail {
                error_code: FETCH_FAILED,
                error_message: message.into(),
                attempts,
            }),
        )
    }

    pub fn from_outcome(
        instrument: &InstrumentDescriptor,
        category: Category,
        outcome: FetchOutcome<Payload>,
        timestamp: i64,
    ) -> Self {
        match outcome {
            FetchOutcome::Success { payload, .. } => {
                Self::success(instrument, category, payload, timestamp)
            }
            FetchOutcome::Failure { message, attempts } => {
                Self::failure(instrument, category, message, attempts, timestamp)
            }
        }
    }

    fn with_body(
        instrument: &InstrumentDescriptor,
        category: Category,
        timestamp: i64,
        body: RecordBody,
    ) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            name: instrument.name.clone(),
            sector: instrument.sector.clone(),
            domain: instrument.domain.clone(),
            category,
            timestamp,
            body,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.body, RecordBody::Failure(_))
    }
}

/// What a consumer can tell about one symbol from the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordState {
    /// No file: not processed in the current run (yet).
    Missing,
    /// File with failure fields.
    Failed,
    /// File with payload fields.
    Succeeded,
    /// File present but not a JSON object.
    Unreadable,
}

impl RecordState {
    /// Classify the contents of a record file.
    pub fn classify(contents: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(contents) {
            Ok(serde_json::Value::Object(map)) => {
                if map.contains_key("ErrorCode") {
                    RecordState::Failed
                } else {
                    RecordState::Succeeded
                }
            }
            _ => RecordState::Unreadable,
        }
    }
}
