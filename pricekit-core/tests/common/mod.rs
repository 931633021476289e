//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use pricekit_core::data::{price_frame, PriceBar};
use pricekit_core::{
    ContextParams, FetcherConfig, PriceProvider, PriceRequest, Provider, ProviderError,
    ProviderRegistry, RawParams,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory provider that records every request it serves.
///
/// Like real providers, the returned frame carries a `symbol` column only
/// when more than one symbol was requested.
#[derive(Default)]
pub struct MockProvider {
    series: HashMap<String, Vec<PriceBar>>,
    quotes: HashMap<String, f64>,
    fail: bool,
    requests: Mutex<Vec<PriceRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_closes(mut self, symbol: &str, start: NaiveDate, closes: &[f64]) -> Self {
        self.series.insert(symbol.to_string(), bars(start, closes));
        self
    }

    pub fn with_quote(mut self, symbol: &str, price: f64) -> Self {
        self.quotes.insert(symbol.to_string(), price);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<PriceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl PriceProvider for MockProvider {
    fn id(&self) -> Provider {
        Provider::Csv
    }

    fn historical_prices(&self, request: &PriceRequest) -> Result<DataFrame, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ProviderError::NetworkUnreachable("mock outage".into()));
        }
        let selected: Vec<(String, Vec<PriceBar>)> = request
            .symbols
            .iter()
            .map(|symbol| {
                let bars = self
                    .series
                    .get(symbol)
                    .map(|bars| {
                        bars.iter()
                            .filter(|b| b.date >= request.start && b.date <= request.end)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                (symbol.clone(), bars)
            })
            .collect();
        Ok(price_frame(&selected)?)
    }

    fn latest_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per calendar day starting at `start`.
pub fn bars(start: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                date: start + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) * 1.01,
                low: open.min(close) * 0.99,
                close,
                adj_close: close,
                volume: 1_000,
                dividends: if i == 1 { 0.25 } else { 0.0 },
                stock_splits: 0.0,
            }
        })
        .collect()
}

/// A zig-zag path with some drift, always positive.
pub fn wave(n: usize, base: f64) -> Vec<f64> {
    (0..n)
        .map(|i| base * (1.0 + 0.002 * i as f64) * (1.0 + 0.03 * (i as f64 * 0.9).sin()))
        .collect()
}

pub fn raw(value: Value) -> RawParams {
    value.as_object().cloned().unwrap()
}

pub fn context(symbols: &str, start: NaiveDate, end: NaiveDate) -> ContextParams {
    ContextParams::from_raw(&raw(serde_json::json!({
        "symbols": symbols,
        "provider": "csv",
        "start_date": start.to_string(),
        "end_date": end.to_string(),
    })))
    .unwrap()
}

pub fn config(provider: Arc<MockProvider>) -> FetcherConfig {
    FetcherConfig::new(ProviderRegistry::new().with(provider))
}
