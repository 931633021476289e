//! Technical-analysis kernels.
//!
//! Kernels take the extracted price table (a `LazyFrame` with `date`,
//! `symbol` and OHLC columns) and produce the command's result table. Row
//! math that is awkward to express as column expressions runs over
//! per-symbol slices, the same way the volatility estimators do.

pub mod mandelbrot;
pub mod momentum;
pub mod volatility;

pub use mandelbrot::{mandelbrot_channel, ChannelOptions, ChannelOutput, RsMethod};
pub use momentum::{momentum, MomentumMethod};
pub use volatility::{Ohlc, RvMethod, TRADING_DAYS_PER_YEAR};

use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("frame error: {0}")]
    Polars(#[from] PolarsError),

    #[error("{symbol}: needs at least {needed} bars, got {got}")]
    InsufficientData {
        symbol: String,
        needed: usize,
        got: usize,
    },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("{0}")]
    Invalid(String),
}

/// One symbol's bars in ascending date order.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBars {
    pub symbol: String,
    /// Days since the Unix epoch, as stored in a polars `Date` column.
    pub dates: Vec<i32>,
    pub bars: Vec<Ohlc>,
}

/// Split a price frame into per-symbol OHLC series.
///
/// Rows with a missing or non-positive price are skipped. Symbols keep the
/// order of their first appearance after sorting by `(symbol, date)`.
pub fn split_by_symbol(data: LazyFrame) -> Result<Vec<SymbolBars>, KernelError> {
    let df = data
        .sort(["symbol", "date"], SortMultipleOptions::default())
        .collect()?;
    for name in ["date", "symbol", "open", "high", "low", "close"] {
        if df.column(name).is_err() {
            return Err(KernelError::MissingColumn(name.to_string()));
        }
    }

    let dates = df.column("date")?.date()?;
    let symbols = df.column("symbol")?.str()?;
    let open = df.column("open")?.cast(&DataType::Float64)?;
    let high = df.column("high")?.cast(&DataType::Float64)?;
    let low = df.column("low")?.cast(&DataType::Float64)?;
    let close = df.column("close")?.cast(&DataType::Float64)?;
    let (open, high, low, close) = (open.f64()?, high.f64()?, low.f64()?, close.f64()?);

    let mut out: Vec<SymbolBars> = Vec::new();
    for i in 0..df.height() {
        let (Some(symbol), Some(date)) = (symbols.get(i), dates.get(i)) else {
            continue;
        };
        let bar = match (open.get(i), high.get(i), low.get(i), close.get(i)) {
            (Some(o), Some(h), Some(l), Some(c)) => Ohlc::new(o, h, l, c),
            _ => continue,
        };
        if !bar.is_valid() {
            continue;
        }
        match out.last_mut() {
            Some(series) if series.symbol == symbol => {
                series.dates.push(date);
                series.bars.push(bar);
            }
            _ => out.push(SymbolBars {
                symbol: symbol.to_string(),
                dates: vec![date],
                bars: vec![bar],
            }),
        }
    }
    Ok(out)
}

/// Bars for tests: open is the previous close, high/low bracket the body.
#[cfg(test)]
pub fn make_frame(symbol: &str, closes: &[f64]) -> DataFrame {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let dates: Vec<chrono::NaiveDate> = (0..closes.len())
        .map(|i| base + chrono::Duration::days(i as i64))
        .collect();
    let opens: Vec<f64> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| if i == 0 { c } else { closes[i - 1] })
        .collect();
    let highs: Vec<f64> = opens.iter().zip(closes).map(|(o, c)| o.max(*c) + 1.0).collect();
    let lows: Vec<f64> = opens.iter().zip(closes).map(|(o, c)| o.min(*c) - 1.0).collect();
    df!(
        "date" => dates,
        "symbol" => vec![symbol; closes.len()],
        "open" => opens,
        "high" => highs,
        "low" => lows,
        "close" => closes.to_vec(),
    )
    .unwrap()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
