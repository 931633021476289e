//! `momentum`: per-symbol lookback momentum.

use crate::envelope::Extra;
use crate::fetcher::{Command, RawSeries};
use crate::indicators::{momentum, KernelError, MomentumMethod};
use crate::params::{coerce_int, parse_choice, FieldValidator, QueryParams};
use crate::schema::{ColumnSpec, ColumnType, DataModel};
use polars::prelude::LazyFrame;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomentumQueryParams {
    pub method: MomentumMethod,
    pub period: usize,
}

impl Default for MomentumQueryParams {
    fn default() -> Self {
        Self {
            method: MomentumMethod::Log,
            period: 1,
        }
    }
}

fn apply_period(p: &mut MomentumQueryParams, v: &Value) -> Result<(), String> {
    let period = coerce_int(v)?;
    if period < 1 {
        return Err(format!("must be >= 1, got {period}"));
    }
    p.period = usize::try_from(period).map_err(|_| format!("{period} is out of range"))?;
    Ok(())
}

impl QueryParams for MomentumQueryParams {
    fn validators() -> Vec<FieldValidator<Self>> {
        vec![
            FieldValidator::new("method", |p: &mut Self, v: &Value| {
                p.method = parse_choice(v)?;
                Ok(())
            }),
            FieldValidator::new("period", apply_period),
        ]
    }
}

pub struct Momentum;

impl Command for Momentum {
    const NAME: &'static str = "momentum";
    type Params = MomentumQueryParams;

    fn data_model() -> DataModel {
        DataModel::new(
            "MomentumData",
            vec![
                ColumnSpec::new("date", ColumnType::Date, "Date", "Date of the observation."),
                ColumnSpec::new("symbol", ColumnType::Utf8, "Symbol", "Ticker symbol."),
                ColumnSpec::new("close", ColumnType::Float64, "Close", "Closing price."),
                ColumnSpec::new(
                    "momentum",
                    ColumnType::Float64,
                    "Momentum",
                    "Change in close over the lookback period; null while the lookback fills.",
                )
                .nullable(),
            ],
        )
    }

    fn transform(
        raw: RawSeries,
        params: &Self::Params,
        extra: &mut Extra,
    ) -> Result<LazyFrame, KernelError> {
        extra.insert("calculation_method".into(), json!(params.method.as_str()));
        extra.insert("period".into(), json!(params.period));
        Ok(momentum(raw.frame, params.method, params.period))
    }
}
