//! `mandelbrot_channel`: rescaled-range price channel.

use crate::data::provider::PriceProvider;
use crate::envelope::{Extra, Warning};
use crate::error::ExtractionError;
use crate::fetcher::{extract_historical, Command, RawSeries};
use crate::indicators::{mandelbrot_channel, ChannelOptions, KernelError, RsMethod, RvMethod};
use crate::params::{
    coerce_bool, expect_str, parse_choice, ContextParams, FieldValidator, QueryParams, Window,
};
use crate::schema::{ColumnSpec, ColumnType, DataModel};
use polars::prelude::LazyFrame;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MandelbrotChannelQueryParams {
    pub window: Window,
    pub rv_adjustment: bool,
    pub rv_method: RvMethod,
    pub rs_method: RsMethod,
    pub rv_grouped_mean: bool,
    pub live_price: bool,
}

impl Default for MandelbrotChannelQueryParams {
    fn default() -> Self {
        Self {
            window: Window::default(),
            rv_adjustment: true,
            rv_method: RvMethod::Std,
            rs_method: RsMethod::Rs,
            rv_grouped_mean: false,
            live_price: false,
        }
    }
}

impl MandelbrotChannelQueryParams {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            trading_days: self.window.trading_days(),
            rv_adjustment: self.rv_adjustment,
            rv_method: self.rv_method,
            rs_method: self.rs_method,
            rv_grouped_mean: self.rv_grouped_mean,
        }
    }
}

impl QueryParams for MandelbrotChannelQueryParams {
    fn validators() -> Vec<FieldValidator<Self>> {
        vec![
            FieldValidator::new("window", |p: &mut Self, v: &Value| {
                p.window = expect_str(v)?.parse()?;
                Ok(())
            }),
            FieldValidator::new("rv_adjustment", |p: &mut Self, v: &Value| {
                p.rv_adjustment = coerce_bool(v)?;
                Ok(())
            }),
            FieldValidator::new("rv_method", |p: &mut Self, v: &Value| {
                p.rv_method = parse_choice(v)?;
                Ok(())
            }),
            FieldValidator::new("rs_method", |p: &mut Self, v: &Value| {
                p.rs_method = parse_choice(v)?;
                Ok(())
            }),
            FieldValidator::new("rv_grouped_mean", |p: &mut Self, v: &Value| {
                p.rv_grouped_mean = coerce_bool(v)?;
                Ok(())
            }),
            FieldValidator::new("live_price", |p: &mut Self, v: &Value| {
                p.live_price = coerce_bool(v)?;
                Ok(())
            }),
        ]
    }
}

pub struct MandelbrotChannel;

impl Command for MandelbrotChannel {
    const NAME: &'static str = "mandelbrot_channel";
    type Params = MandelbrotChannelQueryParams;

    fn data_model() -> DataModel {
        DataModel::new(
            "MandelbrotChannelData",
            vec![
                ColumnSpec::new("date", ColumnType::Date, "Date", "Date of the latest observation."),
                ColumnSpec::new("symbol", ColumnType::Utf8, "Symbol", "Ticker symbol."),
                ColumnSpec::new(
                    "bottom_price",
                    ColumnType::Float64,
                    "Bottom Price",
                    "Lower edge of the channel.",
                ),
                ColumnSpec::new(
                    "recent_price",
                    ColumnType::Float64,
                    "Recent Price",
                    "Latest close, or the live quote when requested.",
                ),
                ColumnSpec::new(
                    "top_price",
                    ColumnType::Float64,
                    "Top Price",
                    "Upper edge of the channel.",
                ),
            ],
        )
    }

    fn extract(
        context: &ContextParams,
        params: &Self::Params,
        provider: &dyn PriceProvider,
        warnings: &mut Vec<Warning>,
    ) -> Result<RawSeries, ExtractionError> {
        let mut raw = extract_historical(context, provider, warnings)?;
        if !params.live_price {
            return Ok(raw);
        }

        for symbol in context.symbols() {
            match provider.latest_price(symbol) {
                Ok(price) if price.is_finite() && price > 0.0 => {
                    raw.quotes.insert(symbol.clone(), price);
                }
                Ok(price) => warnings.push(Warning::new(
                    "live_price",
                    format!("ignoring live price {price} for {symbol}; using last close"),
                )),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "live quote unavailable");
                    warnings.push(Warning::new(
                        "live_price",
                        format!("no live price for {symbol} ({e}); using last close"),
                    ));
                }
            }
        }
        Ok(raw)
    }

    fn transform(
        raw: RawSeries,
        params: &Self::Params,
        extra: &mut Extra,
    ) -> Result<LazyFrame, KernelError> {
        let options = params.channel_options();
        extra.insert("window".into(), json!(params.window.to_string()));
        extra.insert("trading_days".into(), json!(options.trading_days));
        extra.insert("rv_adjustment".into(), json!(params.rv_adjustment));
        extra.insert("rv_method".into(), json!(params.rv_method.as_str()));
        extra.insert("rs_method".into(), json!(params.rs_method.as_str()));
        extra.insert("rv_grouped_mean".into(), json!(params.rv_grouped_mean));
        extra.insert("live_price".into(), json!(params.live_price));

        let output = mandelbrot_channel(raw.frame, &options, &raw.quotes)?;
        extra.insert("windows_used".into(), json!(output.windows_used));
        Ok(output.frame)
    }
}
