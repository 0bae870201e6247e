//! Data acquisition: the capability seam and the Yahoo Finance provider.

pub mod provider;
pub mod yahoo;

pub use provider::{
    Category, ExtendedMetadata, FetchCapability, FetchError, FinancialStatements, FnCapability,
    Payload, PostProcess, PriceHistory, QuoteSnapshot, TechnicalSnapshot,
};
pub use yahoo::{YahooCapability, YahooProvider};
