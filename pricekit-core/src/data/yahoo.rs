//! Yahoo Finance price provider.
//!
//! Fetches daily OHLCV bars plus dividend and split events from Yahoo's v8
//! chart API, one request per symbol. Rate limits, server errors and dropped
//! connections are retried with exponential backoff.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; parse failures surface as `ResponseFormatChanged`.

use super::provider::{price_frame, PriceBar, PriceProvider, PriceRequest, Provider, ProviderError};
use crate::config::YahooSettings;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    events: Option<ChartEvents>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance price provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(settings: &YahooSettings) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).map_or(0, |t| t.and_utc().timestamp());
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map_or(0, |t| t.and_utc().timestamp());
        format!(
            "{}/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true&events=div%2Csplits",
            self.base_url
        )
    }

    fn quote_url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{symbol}?range=1d&interval=1d", self.base_url)
    }

    /// GET a chart document, retrying transient failures.
    fn get_chart(&self, symbol: &str, url: &str) -> Result<ChartResponse, ProviderError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                debug!(symbol, attempt, ?delay, "retrying yahoo request");
                std::thread::sleep(delay);
            }

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(ProviderError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(ProviderError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::SymbolNotFound {
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
                warn!(symbol, retry_after, "yahoo rate limit");
                last_error = Some(ProviderError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status.is_server_error() {
                last_error = Some(ProviderError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }
            if !status.is_success() {
                return Err(ProviderError::Other(format!("HTTP {status} for {symbol}")));
            }

            return resp.json::<ChartResponse>().map_err(|e| {
                ProviderError::ResponseFormatChanged(format!(
                    "failed to parse response for {symbol}: {e}"
                ))
            });
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }

    fn fetch_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let chart = self.get_chart(symbol, &self.chart_url(symbol, start, end))?;
        parse_bars(symbol, chart)
    }
}

fn first_result(symbol: &str, resp: ChartResponse) -> Result<ChartData, ProviderError> {
    let results = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    results
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))
}

fn ts_to_date(ts: i64) -> Result<NaiveDate, ProviderError> {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.naive_utc().date())
        .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))
}

/// Parse a chart response into bars, attaching dividend and split events to
/// the bar on the same date.
fn parse_bars(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, ProviderError> {
    let data = first_result(symbol, resp)?;

    let timestamps = data
        .timestamp
        .ok_or_else(|| ProviderError::ResponseFormatChanged("no timestamps".into()))?;

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("no quote data".into()))?;

    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let events = data.events.unwrap_or_default();
    let mut dividends: HashMap<NaiveDate, f64> = HashMap::new();
    for event in events.dividends.values() {
        *dividends.entry(ts_to_date(event.date)?).or_default() += event.amount;
    }
    let mut splits: HashMap<NaiveDate, f64> = HashMap::new();
    for event in events.splits.values() {
        if event.denominator != 0.0 {
            splits.insert(ts_to_date(event.date)?, event.numerator / event.denominator);
        }
    }

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = ts_to_date(ts)?;

        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();
        let adj_close = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());

        // Holidays come back as all-null rows.
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        let close = close.unwrap_or(f64::NAN);
        bars.push(PriceBar {
            date,
            open: open.unwrap_or(f64::NAN),
            high: high.unwrap_or(f64::NAN),
            low: low.unwrap_or(f64::NAN),
            close,
            adj_close: adj_close.unwrap_or(close),
            volume: volume.unwrap_or(0),
            dividends: dividends.get(&date).copied().unwrap_or(0.0),
            stock_splits: splits.get(&date).copied().unwrap_or(0.0),
        });
    }

    if bars.is_empty() {
        return Err(ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        });
    }
    Ok(bars)
}

impl PriceProvider for YahooProvider {
    fn id(&self) -> Provider {
        Provider::Yahoo
    }

    fn historical_prices(&self, request: &PriceRequest) -> Result<DataFrame, ProviderError> {
        let mut series = Vec::with_capacity(request.symbols.len());
        for symbol in &request.symbols {
            debug!(symbol = symbol.as_str(), start = %request.start, end = %request.end, "fetching yahoo chart");
            let bars = self.fetch_symbol(symbol, request.start, request.end)?;
            series.push((symbol.clone(), bars));
        }
        Ok(price_frame(&series)?)
    }

    fn latest_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        let chart = self.get_chart(symbol, &self.quote_url(symbol))?;
        first_result(symbol, chart)?
            .meta
            .and_then(|m| m.regular_market_price)
            .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("no market price for {symbol}")))
    }
}

/// Longest pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff before retry `attempt` (1-based), capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &str = r#"{
      "chart": {
        "result": [{
          "meta": {"regularMarketPrice": 187.5},
          "timestamp": [1704205800, 1704292200, 1704378600],
          "events": {
            "dividends": {"1704292200": {"amount": 0.24, "date": 1704292200}},
            "splits": {"1704378600": {"date": 1704378600, "numerator": 4, "denominator": 1}}
          },
          "indicators": {
            "quote": [{
              "open":   [185.0, null, 182.0],
              "high":   [188.0, null, 183.5],
              "low":    [183.0, null, 180.9],
              "close":  [185.6, null, 182.7],
              "volume": [82488700, null, 58414500]
            }],
            "adjclose": [{"adjclose": [184.9, null, 182.0]}]
          }
        }],
        "error": null
      }
    }"#;

    fn chart() -> ChartResponse {
        serde_json::from_str(CHART).unwrap()
    }

    #[test]
    fn parses_bars_and_skips_holidays() {
        let bars = parse_bars("AAPL", chart()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].close, 185.6);
        assert_eq!(bars[0].adj_close, 184.9);
        assert_eq!(bars[1].volume, 58_414_500);
    }

    #[test]
    fn attaches_events_to_matching_dates() {
        let bars = parse_bars("AAPL", chart()).unwrap();
        // The dividend fell on the holiday row, which has no bar.
        assert!(bars.iter().all(|b| b.dividends == 0.0));
        assert_eq!(bars[1].stock_splits, 4.0);
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found"}}}"#,
        )
        .unwrap();
        assert!(matches!(
            parse_bars("ZZZZ", resp),
            Err(ProviderError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn reads_market_price_from_meta() {
        let data = first_result("AAPL", chart()).unwrap();
        assert_eq!(data.meta.and_then(|m| m.regular_market_price), Some(187.5));
    }

    #[test]
    fn chart_url_requests_events() {
        let provider = YahooProvider::new(&YahooSettings::default()).unwrap();
        let url = provider.chart_url(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert!(url.contains("/v8/finance/chart/SPY"));
        assert!(url.contains("events=div%2Csplits"));
        assert!(url.contains("period1=1704067200"));
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 8), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
    }
}
