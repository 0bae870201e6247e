//! Domain types shared by the engine and the CLI.

pub mod instrument;
pub mod outcome;
pub mod record;

pub use instrument::{file_stem, InstrumentDescriptor};
pub use outcome::FetchOutcome;
pub use record::{FailureDetail, OutputRecord, RecordBody, RecordState};
