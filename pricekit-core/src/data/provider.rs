//! Price provider capability and structured error types.
//!
//! The `PriceProvider` trait abstracts over data sources (Yahoo Finance, CSV
//! directories) so fetchers can swap implementations and tests can mock them.
//!
//! Frame contract: `date` (Date), `open`, `high`, `low`, `close`, `adj_close`
//! (Float64), `volume` (UInt64), `dividends`, `stock_splits` (Float64). A
//! `symbol` (String) column is present only when more than one symbol was
//! requested; single-symbol frames omit it and the fetcher compensates.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Supported provider identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Yahoo,
    Csv,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Yahoo => "yahoo",
            Provider::Csv => "csv",
        }
    }

    /// Start date used when the caller does not supply one.
    pub fn default_start(&self) -> NaiveDate {
        let (y, m, d) = match self {
            Provider::Yahoo => (1950, 1, 1),
            Provider::Csv => (1970, 1, 1),
        };
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yahoo" | "yfinance" => Ok(Provider::Yahoo),
            "csv" => Ok(Provider::Csv),
            other => Err(format!("unsupported provider '{other}' (expected yahoo or csv)")),
        }
    }
}

/// One daily bar as delivered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
    pub dividends: f64,
    pub stock_splits: f64,
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Structured error types for provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("frame error: {0}")]
    Frame(#[from] PolarsError),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("provider error: {0}")]
    Other(String),
}

/// Source of historical prices.
///
/// Implementations handle the specifics of one source, including any retry
/// policy. They do not know about fetchers or parameters.
pub trait PriceProvider: Send + Sync {
    fn id(&self) -> Provider;

    /// Daily bars for every requested symbol over the date range.
    fn historical_prices(&self, request: &PriceRequest) -> Result<DataFrame, ProviderError>;

    /// Most recent traded price for a symbol.
    fn latest_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} does not serve live quotes for {symbol}",
            self.id()
        )))
    }
}

/// Provider implementations keyed by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn PriceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn PriceProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn PriceProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, id: Provider) -> Option<Arc<dyn PriceProvider>> {
        self.providers.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<Provider> {
        let mut ids: Vec<Provider> = self.providers.keys().copied().collect();
        ids.sort_by_key(|p| p.as_str());
        ids
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

/// Build a provider frame from per-symbol bars.
///
/// The `symbol` column is written only when `series` holds more than one
/// symbol, matching what upstream providers return.
pub fn price_frame(series: &[(String, Vec<PriceBar>)]) -> Result<DataFrame, PolarsError> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let n: usize = series.iter().map(|(_, bars)| bars.len()).sum();

    let mut symbols = Vec::with_capacity(n);
    let mut dates = Vec::with_capacity(n);
    let mut opens = Vec::with_capacity(n);
    let mut highs = Vec::with_capacity(n);
    let mut lows = Vec::with_capacity(n);
    let mut closes = Vec::with_capacity(n);
    let mut adj_closes = Vec::with_capacity(n);
    let mut volumes = Vec::with_capacity(n);
    let mut dividends = Vec::with_capacity(n);
    let mut splits = Vec::with_capacity(n);

    for (symbol, bars) in series {
        for bar in bars {
            symbols.push(symbol.clone());
            dates.push((bar.date - epoch).num_days() as i32);
            opens.push(bar.open);
            highs.push(bar.high);
            lows.push(bar.low);
            closes.push(bar.close);
            adj_closes.push(bar.adj_close);
            volumes.push(bar.volume);
            dividends.push(bar.dividends);
            splits.push(bar.stock_splits);
        }
    }

    let mut columns = vec![Column::new("date".into(), dates).cast(&DataType::Date)?];
    if series.len() > 1 {
        columns.push(Column::new("symbol".into(), symbols));
    }
    columns.extend([
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("adj_close".into(), adj_closes),
        Column::new("volume".into(), volumes),
        Column::new("dividends".into(), dividends),
        Column::new("stock_splits".into(), splits),
    ]);
    DataFrame::new(columns)
}

/// Decode a polars `Date` value (days since the Unix epoch).
///
/// Returns `None` for values outside chrono's representable range.
pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?
        .checked_add_signed(chrono::Duration::days(i64::from(days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            adj_close: close,
            volume: 1000,
            dividends: 0.0,
            stock_splits: 0.0,
        }
    }

    #[test]
    fn provider_parses_aliases() {
        assert_eq!("yahoo".parse::<Provider>().unwrap(), Provider::Yahoo);
        assert_eq!("YFinance".parse::<Provider>().unwrap(), Provider::Yahoo);
        assert_eq!("csv".parse::<Provider>().unwrap(), Provider::Csv);
        assert!("fmp".parse::<Provider>().is_err());
    }

    #[test]
    fn provider_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Provider::Yahoo).unwrap(), "\"yahoo\"");
    }

    #[test]
    fn single_symbol_frame_omits_symbol_column() {
        let df = price_frame(&[("SPY".into(), vec![bar(2, 100.0), bar(3, 101.0)])]).unwrap();
        assert_eq!(df.height(), 2);
        assert!(df.column("symbol").is_err());
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("volume").unwrap().dtype(), &DataType::UInt64);
    }

    #[test]
    fn multi_symbol_frame_has_symbol_column() {
        let df = price_frame(&[
            ("SPY".into(), vec![bar(2, 100.0)]),
            ("QQQ".into(), vec![bar(2, 200.0), bar(3, 201.0)]),
        ])
        .unwrap();
        assert_eq!(df.height(), 3);
        let symbols = df.column("symbol").unwrap().str().unwrap();
        assert_eq!(symbols.get(0), Some("SPY"));
        assert_eq!(symbols.get(2), Some("QQQ"));
    }

    #[test]
    fn epoch_days_decode_in_range_only() {
        assert_eq!(
            date_from_epoch_days(19_724),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(date_from_epoch_days(-1), NaiveDate::from_ymd_opt(1969, 12, 31));
        assert_eq!(date_from_epoch_days(i32::MAX), None);
        assert_eq!(date_from_epoch_days(i32::MIN), None);
    }

    #[test]
    fn registry_returns_registered_provider() {
        struct Null;
        impl PriceProvider for Null {
            fn id(&self) -> Provider {
                Provider::Csv
            }
            fn historical_prices(&self, _: &PriceRequest) -> Result<DataFrame, ProviderError> {
                Ok(DataFrame::empty())
            }
        }

        let registry = ProviderRegistry::new().with(Arc::new(Null));
        assert!(registry.get(Provider::Csv).is_some());
        assert!(registry.get(Provider::Yahoo).is_none());
        assert_eq!(registry.ids(), vec![Provider::Csv]);
        assert!(registry
            .get(Provider::Csv)
            .unwrap()
            .latest_price("SPY")
            .is_err());
    }
}
