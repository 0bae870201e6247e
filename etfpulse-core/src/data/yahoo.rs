//! Yahoo Finance data provider.
//!
//! Uses the v8 chart API for intraday quotes and daily history, and the
//! v10 quoteSummary API for statements, recommendations and calendar events.
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes, so everything beyond the few numeric fields we need is passed
//! through as raw JSON.
//!
//! The provider does not retry. A failed call is reported once and the
//! engine decides what to do with it.

use super::provider::{
    Category, ExtendedMetadata, FetchCapability, FetchError, FinancialStatements, Payload,
    PriceHistory, QuoteSnapshot,
};
use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const FINANCIAL_MODULES: &str =
    "balanceSheetHistory,incomeStatementHistory,cashflowStatementHistory";
const METADATA_MODULES: &str = "recommendationTrend,calendarEvents";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_time: Option<i64>,
    exchange_timezone_name: Option<String>,
    #[serde(rename = "gmtoffset")]
    gmt_offset: Option<i32>,
    market_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Yahoo Finance v10 quoteSummary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    quote_summary: SummaryResult,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    result: Option<Vec<Value>>,
    error: Option<ApiError>,
}

/// Blocking Yahoo Finance client shared by the four category capabilities.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the provider at a different host (mirror, proxy or test server).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Capability for one category, sharing this provider's HTTP client.
    pub fn capability(self: &Arc<Self>, category: Category) -> YahooCapability {
        YahooCapability {
            provider: Arc::clone(self),
            category,
        }
    }

    fn chart_url(&self, symbol: &str, range: &str, interval: &str) -> String {
        format!(
            "{}/v8/finance/chart/{symbol}?range={range}&interval={interval}",
            self.base_url
        )
    }

    fn summary_url(&self, symbol: &str, modules: &str) -> String {
        format!(
            "{}/v10/finance/quoteSummary/{symbol}?modules={modules}",
            self.base_url
        )
    }

    /// Latest one-minute bar of the current session.
    pub fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, FetchError> {
        let resp: ChartResponse = self.get_json(symbol, &self.chart_url(symbol, "1d", "1m"))?;
        parse_quote(symbol, resp)
    }

    /// One year of daily closes, oldest first.
    pub fn history(&self, symbol: &str) -> Result<PriceHistory, FetchError> {
        let resp: ChartResponse = self.get_json(symbol, &self.chart_url(symbol, "1y", "1d"))?;
        parse_history(symbol, resp)
    }

    pub fn financials(&self, symbol: &str) -> Result<FinancialStatements, FetchError> {
        let resp: SummaryResponse =
            self.get_json(symbol, &self.summary_url(symbol, FINANCIAL_MODULES))?;
        parse_financials(symbol, resp)
    }

    pub fn metadata(&self, symbol: &str) -> Result<ExtendedMetadata, FetchError> {
        let resp: SummaryResponse =
            self.get_json(symbol, &self.summary_url(symbol, METADATA_MODULES))?;
        parse_metadata(symbol, resp)
    }

    /// Execute one GET and decode the JSON body, mapping transport and
    /// status failures onto `FetchError`.
    fn get_json<T: DeserializeOwned>(&self, symbol: &str, url: &str) -> Result<T, FetchError> {
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                FetchError::NetworkUnreachable(e.to_string())
            } else {
                FetchError::Other(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            return Err(FetchError::Other(format!("HTTP {status} for {symbol}")));
        }

        resp.json::<T>().map_err(|e| {
            FetchError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })
    }
}

/// `FetchCapability` adapter selecting one Yahoo endpoint by category.
///
/// The technical category returns the raw `PriceHistory`; indicators are
/// computed by the `IndicatorStep` post-process.
pub struct YahooCapability {
    provider: Arc<YahooProvider>,
    category: Category,
}

impl FetchCapability for YahooCapability {
    fn category(&self) -> Category {
        self.category
    }

    fn fetch(&self, symbol: &str) -> Result<Payload, FetchError> {
        match self.category {
            Category::Quote => self.provider.quote(symbol).map(Payload::Quote),
            Category::Metadata => self.provider.metadata(symbol).map(Payload::Metadata),
            Category::Financials => self.provider.financials(symbol).map(Payload::Financials),
            Category::Technical => self.provider.history(symbol).map(Payload::History),
        }
    }
}

fn chart_data(symbol: &str, resp: ChartResponse) -> Result<ChartData, FetchError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) => api_error(symbol, err),
        None => FetchError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    result.into_iter().next().ok_or_else(|| FetchError::NoData {
        symbol: symbol.to_string(),
    })
}

fn api_error(symbol: &str, err: ApiError) -> FetchError {
    if err.code == "Not Found" {
        FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        }
    } else {
        FetchError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
    }
}

fn parse_quote(symbol: &str, resp: ChartResponse) -> Result<QuoteSnapshot, FetchError> {
    let data = chart_data(symbol, resp)?;
    let no_data = || FetchError::NoData {
        symbol: symbol.to_string(),
    };
    let quote = data.indicators.quote.into_iter().next().ok_or_else(no_data)?;

    // Latest bar with a close; trailing minutes can be all-null.
    let i = quote
        .close
        .iter()
        .rposition(|c| c.is_some())
        .ok_or_else(no_data)?;

    let field = |v: &[Option<f64>]| v.get(i).copied().flatten().unwrap_or(f64::NAN);
    let meta = data.meta;

    Ok(QuoteSnapshot {
        open: field(&quote.open),
        high: field(&quote.high),
        low: field(&quote.low),
        close: field(&quote.close),
        volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        market_state: meta.market_state.unwrap_or_else(|| "CLOSED".to_string()),
        market_close_time: market_close_time(meta.regular_market_time, meta.gmt_offset),
        exchange_timezone: meta
            .exchange_timezone_name
            .unwrap_or_else(|| "UTC".to_string()),
    })
}

/// Render the provider's market time in the exchange's UTC offset.
fn market_close_time(regular_market_time: Option<i64>, gmt_offset: Option<i32>) -> String {
    let offset = FixedOffset::east_opt(gmt_offset.unwrap_or(0));
    match (regular_market_time.and_then(|t| DateTime::from_timestamp(t, 0)), offset) {
        (Some(dt), Some(offset)) => dt.with_timezone(&offset).to_rfc3339(),
        _ => "N/A".to_string(),
    }
}

fn parse_history(symbol: &str, resp: ChartResponse) -> Result<PriceHistory, FetchError> {
    let data = chart_data(symbol, resp)?;
    let closes: Vec<f64> = data
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close.into_iter().flatten().filter(|c| c.is_finite()).collect())
        .unwrap_or_default();

    if closes.is_empty() {
        return Err(FetchError::NoData {
            symbol: symbol.to_string(),
        });
    }

    Ok(PriceHistory { closes })
}

fn summary_module(symbol: &str, resp: SummaryResponse) -> Result<Value, FetchError> {
    let result = resp.quote_summary.result.ok_or_else(|| match resp.quote_summary.error {
        Some(err) => api_error(symbol, err),
        None => FetchError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    result.into_iter().next().ok_or_else(|| FetchError::NoData {
        symbol: symbol.to_string(),
    })
}

/// Rows at `module.key`, or an empty table when the section is absent.
fn rows(summary: &Value, module: &str, key: &str) -> Vec<Value> {
    summary
        .get(module)
        .and_then(|m| m.get(key))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn parse_financials(symbol: &str, resp: SummaryResponse) -> Result<FinancialStatements, FetchError> {
    let summary = summary_module(symbol, resp)?;
    let statements = FinancialStatements {
        balance_sheet: rows(&summary, "balanceSheetHistory", "balanceSheetStatements"),
        income_statement: rows(&summary, "incomeStatementHistory", "incomeStatementHistory"),
        cash_flow: rows(&summary, "cashflowStatementHistory", "cashflowStatements"),
    };

    if statements.balance_sheet.is_empty()
        && statements.income_statement.is_empty()
        && statements.cash_flow.is_empty()
    {
        return Err(FetchError::NoData {
            symbol: symbol.to_string(),
        });
    }

    Ok(statements)
}

fn parse_metadata(symbol: &str, resp: SummaryResponse) -> Result<ExtendedMetadata, FetchError> {
    let summary = summary_module(symbol, resp)?;
    Ok(ExtendedMetadata {
        recommendations: rows(&summary, "recommendationTrend", "trend"),
        calendar: summary
            .get("calendarEvents")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    fn summary(json: &str) -> SummaryResponse {
        serde_json::from_str(json).unwrap()
    }

    const INTRADAY: &str = r#"{"chart":{"result":[{
        "meta":{"regularMarketTime":1700000000,"exchangeTimezoneName":"America/New_York","gmtoffset":-18000},
        "timestamp":[1,2,3],
        "indicators":{"quote":[{
            "open":[10.0,11.0,null],"high":[10.5,11.5,null],"low":[9.5,10.5,null],
            "close":[10.2,11.2,null],"volume":[100,200,null]}]}}],"error":null}}"#;

    #[test]
    fn quote_takes_last_bar_with_close() {
        let q = parse_quote("SPY", chart(INTRADAY)).unwrap();
        assert_eq!(q.open, 11.0);
        assert_eq!(q.close, 11.2);
        assert_eq!(q.volume, 200);
        assert_eq!(q.market_state, "CLOSED");
        assert_eq!(q.exchange_timezone, "America/New_York");
        assert_eq!(q.market_close_time, "2023-11-14T17:13:20-05:00");
    }

    #[test]
    fn quote_without_closes_is_no_data() {
        let resp = chart(
            r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{"close":[null,null]}]}}],"error":null}}"#,
        );
        assert_eq!(
            parse_quote("SPY", resp).unwrap_err(),
            FetchError::NoData {
                symbol: "SPY".into()
            }
        );
    }

    #[test]
    fn market_close_time_missing_is_na() {
        assert_eq!(market_close_time(None, Some(-18000)), "N/A");
    }

    #[test]
    fn chart_not_found_maps_to_symbol_not_found() {
        let resp = chart(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        );
        assert_eq!(
            parse_history("ZZZZ", resp).unwrap_err(),
            FetchError::SymbolNotFound {
                symbol: "ZZZZ".into()
            }
        );
    }

    #[test]
    fn history_drops_missing_closes() {
        let resp = chart(
            r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[1.0,null,3.0]}]}}],"error":null}}"#,
        );
        let h = parse_history("SPY", resp).unwrap();
        assert_eq!(h.closes, vec![1.0, 3.0]);
    }

    #[test]
    fn financials_extracts_statement_tables() {
        let resp = summary(
            r#"{"quoteSummary":{"result":[{
                "balanceSheetHistory":{"balanceSheetStatements":[{"totalAssets":{"raw":1}}]},
                "incomeStatementHistory":{"incomeStatementHistory":[{"netIncome":{"raw":2}},{"netIncome":{"raw":3}}]}
            }],"error":null}}"#,
        );
        let f = parse_financials("SPY", resp).unwrap();
        assert_eq!(f.balance_sheet.len(), 1);
        assert_eq!(f.income_statement.len(), 2);
        assert!(f.cash_flow.is_empty());
    }

    #[test]
    fn financials_all_empty_is_no_data() {
        let resp = summary(r#"{"quoteSummary":{"result":[{}],"error":null}}"#);
        assert!(matches!(
            parse_financials("SPY", resp),
            Err(FetchError::NoData { .. })
        ));
    }

    #[test]
    fn metadata_defaults_missing_sections() {
        let resp = summary(
            r#"{"quoteSummary":{"result":[{"recommendationTrend":{"trend":[{"period":"0m","buy":3}]}}],"error":null}}"#,
        );
        let m = parse_metadata("SPY", resp).unwrap();
        assert_eq!(m.recommendations.len(), 1);
        assert!(m.calendar.as_object().unwrap().is_empty());
    }

    #[test]
    fn summary_error_is_reported() {
        let resp = summary(
            r#"{"quoteSummary":{"result":null,"error":{"code":"Unauthorized","description":"Invalid Crumb"}}}"#,
        );
        assert!(matches!(
            parse_metadata("SPY", resp),
            Err(FetchError::ResponseFormatChanged(msg)) if msg.contains("Invalid Crumb")
        ));
    }

    #[test]
    fn urls_use_configured_base() {
        let p = YahooProvider::with_base_url("http://localhost:9999/").unwrap();
        assert_eq!(
            p.chart_url("SPY", "1y", "1d"),
            "http://localhost:9999/v8/finance/chart/SPY?range=1y&interval=1d"
        );
        assert!(p.summary_url("SPY", METADATA_MODULES).ends_with("modules=recommendationTrend,calendarEvents"));
    }
}
