//! Momentum over a fixed lookback, per symbol.
//!
//! log:    ln(close[t] / close[t-period])
//! simple: close[t] / close[t-period] - 1
//! shift:  close[t] - close[t-period]
//! The first `period` rows of each symbol are null.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MomentumMethod {
    #[default]
    Log,
    Simple,
    Shift,
}

impl MomentumMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MomentumMethod::Log => "log",
            MomentumMethod::Simple => "simple",
            MomentumMethod::Shift => "shift",
        }
    }
}

impl fmt::Display for MomentumMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MomentumMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(MomentumMethod::Log),
            "simple" => Ok(MomentumMethod::Simple),
            "shift" => Ok(MomentumMethod::Shift),
            other => Err(format!(
                "unknown momentum method '{other}' (expected log, simple or shift)"
            )),
        }
    }
}

/// Lazily compute momentum; output columns are `date, symbol, close, momentum`.
pub fn momentum(data: LazyFrame, method: MomentumMethod, period: usize) -> LazyFrame {
    let prior = col("close")
        .shift(lit(period as i64))
        .over([col("symbol")]);
    let value = match method {
        MomentumMethod::Log => (col("close") / prior).log(std::f64::consts::E),
        MomentumMethod::Simple => col("close") / prior - lit(1.0),
        MomentumMethod::Shift => col("close") - prior,
    };

    data.sort(["symbol", "date"], SortMultipleOptions::default())
        .select([
            col("date"),
            col("symbol"),
            col("close").cast(DataType::Float64),
            value.cast(DataType::Float64).alias("momentum"),
        ])
}
