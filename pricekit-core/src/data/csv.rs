//! CSV directory provider.
//!
//! Reads `{dir}/{SYMBOL}.csv` with at least `date,open,high,low,close,volume`
//! columns. `adj_close` defaults to `close`; `dividends` and `stock_splits`
//! default to zero when absent.

use super::provider::{PriceProvider, PriceRequest, Provider, ProviderError};
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::{Path, PathBuf};

pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn load_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, ProviderError> {
        let path = self.symbol_path(symbol);
        if !path.exists() {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        let df = LazyCsvReader::new(&path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()?
            .filter(col("date").gt_eq(lit(start)).and(col("date").lt_eq(lit(end))))
            .collect()?;

        let has = |name: &str| df.column(name).is_ok();
        let price = |name: &str| col(name).cast(DataType::Float64);
        let or_zero = |name: &str| {
            if has(name) {
                col(name).cast(DataType::Float64)
            } else {
                lit(0.0).alias(name)
            }
        };
        let adj_close = if has("adj_close") {
            price("adj_close")
        } else {
            price("close").alias("adj_close")
        };

        let columns = [
            col("date").cast(DataType::Date),
            price("open"),
            price("high"),
            price("low"),
            price("close"),
            adj_close,
            col("volume").cast(DataType::UInt64),
            or_zero("dividends"),
            or_zero("stock_splits"),
        ];

        df.lazy()
            .select(columns)
            .sort(["date"], SortMultipleOptions::default())
            .collect()
            .map_err(ProviderError::from)
    }
}

impl PriceProvider for CsvProvider {
    fn id(&self) -> Provider {
        Provider::Csv
    }

    fn historical_prices(&self, request: &PriceRequest) -> Result<DataFrame, ProviderError> {
        if let [symbol] = request.symbols.as_slice() {
            return self.load_symbol(symbol, request.start, request.end);
        }

        let mut combined: Option<DataFrame> = None;
        for symbol in &request.symbols {
            let frame = self
                .load_symbol(symbol, request.start, request.end)?
                .lazy()
                .with_column(lit(symbol.as_str()).alias("symbol"))
                .select([
                    col("date"),
                    col("symbol"),
                    col("open"),
                    col("high"),
                    col("low"),
                    col("close"),
                    col("adj_close"),
                    col("volume"),
                    col("dividends"),
                    col("stock_splits"),
                ])
                .collect()?;
            match combined.as_mut() {
                Some(acc) => {
                    acc.vstack_mut(&frame)?;
                }
                None => combined = Some(frame),
            }
        }
        combined.ok_or_else(|| ProviderError::Other("no symbols requested".into()))
    }
}
