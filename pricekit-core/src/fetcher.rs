//! The transform-extract-transform fetch pipeline.
//!
//! A `Fetcher` runs one command once:
//!
//! 1. `transform_query`: validate the command's parameters.
//! 2. `extract_data`: call the context's provider and normalize the frame.
//! 3. `transform_data`: run the command kernel and validate its output.
//!
//! `fetch` drives all three in order and wraps the result in an `Envelope`.
//! The stages are public so callers can step through them, but each one
//! checks that the previous stage completed. A failure in any stage moves
//! the fetcher to `Stage::Failed`, after which nothing else runs.

use crate::data::provider::{
    date_from_epoch_days, PriceProvider, PriceRequest, ProviderRegistry,
};
use crate::envelope::{Envelope, Extra, Warning};
use crate::error::{ExtractionError, FetchError, TransformError};
use crate::indicators::KernelError;
use crate::params::{ContextParams, QueryParams, RawParams};
use crate::schema::{DataModel, ResultTable};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Dispatch};

/// Provider columns that never reach a kernel.
pub const DROPPED_COLUMNS: [&str; 2] = ["dividends", "stock_splits"];

/// Days of slack before a narrower-than-requested date range is reported.
const COVERAGE_TOLERANCE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    QueryTransformed,
    DataExtracted,
    DataTransformed,
    Enveloped,
    Failed,
}

/// Shared services a fetcher needs: providers and an optional log sink.
#[derive(Clone, Default)]
pub struct FetcherConfig {
    pub providers: Arc<ProviderRegistry>,
    pub log: Option<Dispatch>,
}

impl FetcherConfig {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers: Arc::new(providers),
            log: None,
        }
    }

    /// Route pipeline events to `dispatch` for the duration of each fetch.
    pub fn with_log(mut self, dispatch: Dispatch) -> Self {
        self.log = Some(dispatch);
        self
    }
}

impl fmt::Debug for FetcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherConfig")
            .field("providers", &self.providers)
            .field("log", &self.log.is_some())
            .finish()
    }
}

/// Extracted data handed from `extract_data` to `transform_data`.
pub struct RawSeries {
    /// Prices sorted by `(symbol, date)`, always carrying a `symbol` column.
    pub frame: LazyFrame,
    pub symbols: Vec<String>,
    /// Live quotes keyed by symbol, when the command asked for them.
    pub quotes: BTreeMap<String, f64>,
}

/// A fetchable command: its parameters, output model and kernel.
pub trait Command {
    const NAME: &'static str;
    type Params: QueryParams;

    fn data_model() -> DataModel;

    /// Pull raw data for the command. The default fetches daily history.
    fn extract(
        context: &ContextParams,
        _params: &Self::Params,
        provider: &dyn PriceProvider,
        warnings: &mut Vec<Warning>,
    ) -> Result<RawSeries, ExtractionError> {
        extract_historical(context, provider, warnings)
    }

    /// Build the result table. Diagnostics go into `extra`.
    fn transform(
        raw: RawSeries,
        params: &Self::Params,
        extra: &mut Extra,
    ) -> Result<LazyFrame, KernelError>;
}

/// Fetch daily history for the context and normalize it.
///
/// Drops dividend and split columns, adds a `symbol` column when a single
/// symbol was requested (providers omit it in that case), and sorts by
/// `(symbol, date)`. Every requested symbol must come back with at least one
/// row. A symbol whose bars cover noticeably less than the requested range
/// is reported as a warning.
pub fn extract_historical(
    context: &ContextParams,
    provider: &dyn PriceProvider,
    warnings: &mut Vec<Warning>,
) -> Result<RawSeries, ExtractionError> {
    let request = PriceRequest {
        symbols: context.symbols().to_vec(),
        start: context.start_date(),
        end: context.end_date(),
    };
    debug!(
        symbols = ?request.symbols,
        start = %request.start,
        end = %request.end,
        "requesting history"
    );
    let frame = provider
        .historical_prices(&request)
        .map_err(|source| ExtractionError::Provider {
            provider: context.provider(),
            source,
        })?;

    let spans = symbol_spans(context, &frame)?;
    let missing: Vec<&str> = request
        .symbols
        .iter()
        .filter(|symbol| !spans.contains_key(symbol.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ExtractionError::Empty {
            provider: context.provider(),
            symbols: missing.join(","),
        });
    }
    check_coverage(context, &spans, warnings);

    let keep: Vec<Expr> = frame
        .get_column_names()
        .into_iter()
        .filter(|name| !DROPPED_COLUMNS.contains(&name.as_str()))
        .map(|name| col(name.clone()))
        .collect();

    let mut lazy = frame.lazy().select(keep);
    if let [symbol] = context.symbols() {
        lazy = lazy.with_column(lit(symbol.as_str()).alias("symbol"));
    }

    Ok(RawSeries {
        frame: lazy.sort(["symbol", "date"], SortMultipleOptions::default()),
        symbols: request.symbols,
        quotes: BTreeMap::new(),
    })
}

/// First and last bar date of every symbol present in `frame`.
fn symbol_spans(
    context: &ContextParams,
    frame: &DataFrame,
) -> Result<BTreeMap<String, (NaiveDate, NaiveDate)>, ExtractionError> {
    if frame.height() == 0 {
        return Ok(BTreeMap::new());
    }
    let frame_err = |e: PolarsError| ExtractionError::Frame(e.to_string());
    let dates = frame.column("date").map_err(frame_err)?.date().map_err(frame_err)?;
    let single = match context.symbols() {
        [symbol] => Some(symbol.as_str()),
        _ => None,
    };
    let symbols = match (single, frame.column("symbol")) {
        (Some(_), _) => None,
        (None, Ok(column)) => Some(column.str().map_err(frame_err)?),
        (None, Err(_)) => {
            return Err(ExtractionError::Frame(
                "multi-symbol frame has no 'symbol' column".into(),
            ))
        }
    };

    let mut days: BTreeMap<&str, (i32, i32)> = BTreeMap::new();
    for i in 0..frame.height() {
        let symbol = single.or_else(|| symbols.and_then(|ca| ca.get(i)));
        let (Some(symbol), Some(day)) = (symbol, dates.get(i)) else {
            continue;
        };
        days.entry(symbol)
            .and_modify(|(first, last)| {
                *first = (*first).min(day);
                *last = (*last).max(day);
            })
            .or_insert((day, day));
    }

    days.into_iter()
        .map(|(symbol, (first, last))| {
            match (date_from_epoch_days(first), date_from_epoch_days(last)) {
                (Some(first), Some(last)) => Ok((symbol.to_string(), (first, last))),
                _ => Err(ExtractionError::Frame(format!(
                    "{symbol}: bar date outside the representable range"
                ))),
            }
        })
        .collect()
}

fn check_coverage(
    context: &ContextParams,
    spans: &BTreeMap<String, (NaiveDate, NaiveDate)>,
    warnings: &mut Vec<Warning>,
) {
    let provider = context.provider();
    for symbol in context.symbols() {
        let Some(&(first, last)) = spans.get(symbol) else {
            continue;
        };
        if context.start_is_explicit()
            && (first - context.start_date()).num_days() > COVERAGE_TOLERANCE_DAYS
        {
            warnings.push(Warning::new(
                "date_range",
                format!(
                    "{provider} data for {symbol} starts {first}, later than the requested start {}",
                    context.start_date()
                ),
            ));
        }
        if (context.end_date() - last).num_days() > COVERAGE_TOLERANCE_DAYS {
            warnings.push(Warning::new(
                "date_range",
                format!(
                    "{provider} data for {symbol} ends {last}, earlier than the requested end {}",
                    context.end_date()
                ),
            ));
        }
    }
}

/// Single-use runner for one command.
pub struct Fetcher<C: Command> {
    context: Arc<ContextParams>,
    overrides: Option<RawParams>,
    config: FetcherConfig,
    stage: Stage,
    params: Option<C::Params>,
    raw: Option<RawSeries>,
    results: Option<ResultTable>,
    warnings: Vec<Warning>,
    extra: Extra,
}

impl<C: Command> Fetcher<C> {
    pub fn new(
        context: Arc<ContextParams>,
        command_params: Option<RawParams>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            context,
            overrides: command_params,
            config,
            stage: Stage::Created,
            params: None,
            raw: None,
            results: None,
            warnings: Vec::new(),
            extra: Extra::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> &ContextParams {
        &self.context
    }

    /// Validated parameters, once `transform_query` has run.
    pub fn command_params(&self) -> Option<&C::Params> {
        self.params.as_ref()
    }

    /// Warnings raised by this fetcher so far (context warnings excluded).
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    fn enter(&self, expected: Stage) -> Result<(), FetchError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(FetchError::Stage {
                expected,
                actual: self.stage,
            })
        }
    }

    fn fail(&mut self, err: impl Into<FetchError>) -> FetchError {
        let err = err.into();
        warn!(command = C::NAME, stage = ?self.stage, error = %err, "stage failed");
        self.stage = Stage::Failed;
        err
    }

    fn missing(&mut self, expected: Stage) -> FetchError {
        let actual = self.stage;
        self.stage = Stage::Failed;
        FetchError::Stage { expected, actual }
    }

    /// Stage 1: validate command parameters, or take the defaults.
    pub fn transform_query(&mut self) -> Result<(), FetchError> {
        self.enter(Stage::Created)?;
        let validated = match &self.overrides {
            None => Ok(C::Params::default()),
            Some(raw) => C::Params::from_raw(raw),
        };
        match validated {
            Ok(params) => {
                debug!(command = C::NAME, params = ?params, "query validated");
                self.params = Some(params);
                self.stage = Stage::QueryTransformed;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stage 2: call the provider.
    pub fn extract_data(&mut self) -> Result<(), FetchError> {
        self.enter(Stage::QueryTransformed)?;
        let Some(params) = self.params.as_ref() else {
            return Err(self.missing(Stage::QueryTransformed));
        };

        let id = self.context.provider();
        let extracted = match self.config.providers.get(id) {
            Some(provider) => C::extract(&self.context, params, provider.as_ref(), &mut self.warnings),
            None => Err(ExtractionError::NotConfigured(id)),
        };
        match extracted {
            Ok(raw) => {
                info!(
                    command = C::NAME,
                    provider = %id,
                    symbols = raw.symbols.len(),
                    "data extracted"
                );
                self.raw = Some(raw);
                self.stage = Stage::DataExtracted;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stage 3: run the kernel and validate its output.
    pub fn transform_data(&mut self) -> Result<(), FetchError> {
        self.enter(Stage::DataExtracted)?;
        let (Some(raw), Some(params)) = (self.raw.take(), self.params.as_ref()) else {
            return Err(self.missing(Stage::DataExtracted));
        };

        let transformed = C::transform(raw, params, &mut self.extra)
            .and_then(|lazy| lazy.collect().map_err(KernelError::from))
            .map_err(|e| TransformError::Kernel {
                command: C::NAME,
                message: e.to_string(),
            })
            .and_then(|df| {
                C::data_model()
                    .validate(df)
                    .map_err(|source| TransformError::Schema {
                        command: C::NAME,
                        source,
                    })
            });
        match transformed {
            Ok(table) => {
                debug!(command = C::NAME, rows = table.len(), "results validated");
                self.results = Some(table);
                self.stage = Stage::DataTransformed;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Package the results. Consumes the fetcher.
    pub fn envelope(mut self) -> Result<Envelope<C::Params>, FetchError> {
        self.enter(Stage::DataTransformed)?;
        let (Some(results), Some(params)) = (self.results.take(), self.params.take()) else {
            return Err(self.missing(Stage::DataTransformed));
        };

        let mut warnings = self.context.warnings().to_vec();
        warnings.append(&mut self.warnings);
        self.stage = Stage::Enveloped;

        Ok(Envelope::new(
            results,
            self.context.provider(),
            warnings,
            ContextParams::clone(&self.context),
            params,
            std::mem::take(&mut self.extra),
        ))
    }

    /// Run every stage and return the envelope.
    pub fn fetch(self) -> Result<Envelope<C::Params>, FetchError> {
        match self.config.log.clone() {
            Some(dispatch) => tracing::dispatcher::with_default(&dispatch, move || self.run()),
            None => self.run(),
        }
    }

    fn run(mut self) -> Result<Envelope<C::Params>, FetchError> {
        let span = info_span!("fetch", command = C::NAME, provider = %self.context.provider());
        let _entered = span.enter();

        self.transform_query()?;
        self.extract_data()?;
        self.transform_data()?;
        let envelope = self.envelope()?;
        info!(
            rows = envelope.results().len(),
            warnings = envelope.warnings().len(),
            "fetch complete"
        );
        Ok(envelope)
    }
}
