//! Fetch capability trait, payload types and structured error types.
//!
//! A `FetchCapability` turns a symbol into a category-specific `Payload`.
//! The engine never looks inside a payload; it only needs to know whether
//! the call failed. One implementation exists per data category, and an
//! optional `PostProcess` step (the indicator calculator) can reshape the
//! payload before it is persisted.

use crate::indicators::IndicatorSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The four kinds of data fetched per instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Latest intraday quote. Time-sensitive, refreshed hourly.
    Quote,
    /// Analyst recommendations and calendar events.
    Metadata,
    /// Balance sheet, income statement and cash-flow tables.
    Financials,
    /// Technical indicators derived from one year of daily closes.
    Technical,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Quote,
        Category::Metadata,
        Category::Financials,
        Category::Technical,
    ];

    /// Stable lowercase identifier used in config keys, CLI args and file names.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Quote => "quote",
            Category::Metadata => "metadata",
            Category::Financials => "financials",
            Category::Technical => "technical",
        }
    }

    /// Directory name under the output root.
    pub fn default_dir(self) -> &'static str {
        match self {
            Category::Quote => "ETF_individual",
            Category::Metadata => "additional",
            Category::Financials => "financials",
            Category::Technical => "technical",
        }
    }

    /// Log file name for one run of this category.
    pub fn log_file_name(self) -> String {
        format!("data_{}.log", self.slug())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quote" | "quotes" => Ok(Category::Quote),
            "metadata" | "additional" => Ok(Category::Metadata),
            "financials" => Ok(Category::Financials),
            "technical" => Ok(Category::Technical),
            other => Err(format!(
                "unknown category '{other}' (expected quote, metadata, financials or technical)"
            )),
        }
    }
}

/// Structured error types for a single fetch attempt.
///
/// The retry executor treats every variant the same way; the variants
/// exist so the final error message in an output record is specific.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no data returned for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient history for {symbol}: {have} closes, need at least {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },

    #[error("unexpected payload for {step}: got {got}")]
    UnexpectedPayload { step: String, got: &'static str },

    #[error("fetch error: {0}")]
    Other(String),
}

/// Latest intraday bar plus market status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct QuoteSnapshot {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub market_state: String,
    /// Provider-supplied close time rendered with the exchange offset, or `N/A`.
    pub market_close_time: String,
    pub exchange_timezone: String,
}

/// Analyst recommendation rows and calendar events, passed through as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedMetadata {
    pub recommendations: Vec<serde_json::Value>,
    pub calendar: serde_json::Value,
}

/// Statement tables, one JSON object per reporting period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FinancialStatements {
    pub balance_sheet: Vec<serde_json::Value>,
    pub income_statement: Vec<serde_json::Value>,
    pub cash_flow: Vec<serde_json::Value>,
}

/// Daily closing prices, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PriceHistory {
    pub closes: Vec<f64>,
}

/// Indicator set computed from a `PriceHistory`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TechnicalSnapshot {
    pub technical_indicators: IndicatorSet,
    /// Number of closes the indicators were computed over.
    pub observations: usize,
}

/// Category-specific success payload.
///
/// Serialized untagged so the payload fields sit at the top level of the
/// output record, next to the identity fields.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    Quote(QuoteSnapshot),
    Metadata(ExtendedMetadata),
    Financials(FinancialStatements),
    History(PriceHistory),
    Technical(TechnicalSnapshot),
}

impl Payload {
    /// Variant name, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Quote(_) => "quote",
            Payload::Metadata(_) => "metadata",
            Payload::Financials(_) => "financials",
            Payload::History(_) => "history",
            Payload::Technical(_) => "technical",
        }
    }
}

/// A per-category data source: given a symbol, return its payload or fail.
///
/// Implementations must not retry internally; the engine owns retry policy.
pub trait FetchCapability: Send + Sync {
    /// The category this capability serves.
    fn category(&self) -> Category;

    /// Fetch the payload for one symbol.
    fn fetch(&self, symbol: &str) -> Result<Payload, FetchError>;
}

/// Optional step run on a fetched payload before it is persisted.
///
/// Runs inside the retry loop: an error here counts as a failed attempt.
pub trait PostProcess: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, symbol: &str, payload: Payload) -> Result<Payload, FetchError>;
}

/// Closure-backed capability, for tests and ad-hoc sources.
pub struct FnCapability<F> {
    category: Category,
    f: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&str) -> Result<Payload, FetchError> + Send + Sync,
{
    pub fn new(category: Category, f: F) -> Self {
        Self { category, f }
    }
}

impl<F> FetchCapability for FnCapability<F>
where
    F: Fn(&str) -> Result<Payload, FetchError> + Send + Sync,
{
    fn category(&self) -> Category {
        self.category
    }

    fn fetch(&self, symbol: &str) -> Result<Payload, FetchError> {
        (self.f)(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_slugs_and_aliases() {
        for cat in Category::ALL {
            assert_eq!(cat.slug().parse::<Category>().unwrap(), cat);
        }
        assert_eq!("additional".parse::<Category>().unwrap(), Category::Metadata);
        assert_eq!("QUOTE".parse::<Category>().unwrap(), Category::Quote);
        assert!("bonds".parse::<Category>().is_err());
    }

    #[test]
    fn category_paths() {
        assert_eq!(Category::Quote.default_dir(), "ETF_individual");
        assert_eq!(Category::Technical.log_file_name(), "data_technical.log");
    }

    #[test]
    fn quote_payload_serializes_flat_pascal_case() {
        let payload = Payload::Quote(QuoteSnapshot {
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100,
            market_state: "CLOSED".into(),
            market_close_time: "N/A".into(),
            exchange_timezone: "America/New_York".into(),
        });
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["Close"], 1.5);
        assert_eq!(v["MarketState"], "CLOSED");
        assert!(v.get("Quote").is_none(), "payload must be untagged");
    }

    #[test]
    fn fn_capability_delegates() {
        let cap = FnCapability::new(Category::Financials, |symbol: &str| {
            Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        });
        assert_eq!(cap.category(), Category::Financials);
        assert_eq!(
            cap.fetch("ZZZ").unwrap_err(),
            FetchError::SymbolNotFound {
                symbol: "ZZZ".into()
            }
        );
    }
}
