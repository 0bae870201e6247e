//! ETFPulse Core: domain types, catalog, fetch capabilities, indicators.
//!
//! This crate holds everything the fetch-and-persist engine needs that is
//! not about scheduling:
//! - Instrument descriptors and the per-symbol output record shape
//! - Catalog loading (Sector → Domain → Instrument, flattened in order)
//! - The `FetchCapability` trait and per-category payload types
//! - The Yahoo Finance blocking provider (one capability per category)
//! - The technical indicator calculator (SMA, EMA, RSI, MACD)

pub mod catalog;
pub mod data;
pub mod domain;
pub mod indicators;

pub use catalog::{Catalog, CatalogError};
pub use data::provider::{Category, FetchCapability, FetchError, Payload, PostProcess};
pub use domain::{InstrumentDescriptor, OutputRecord, RecordBody, RecordState};
pub use indicators::{IndicatorSet, IndicatorStep};
